mod common;

use common::{region_path, TestLink};
use std::time::Duration;
use vclink_core::server::LinkServer;
use vclink_core::session::Vec3;
use vclink_link::{LinkError, LinkReader, LinkWriter};

#[test]
fn versions_are_monotonic_across_events() {
    let mut link = TestLink::new(8);
    let reader = link.reader();

    let p1 = link.join("P1");
    let v1 = reader.read().unwrap().version;
    link.server.on_world_change(p1, "overworld");
    let v2 = reader.read().unwrap().version;
    link.server.on_position_tick(p1, Vec3::new(1.0, 64.0, 1.0), Vec3::ZERO);
    let v3 = reader.read().unwrap().version;

    assert!(v1 < v2 && v2 < v3);
}

#[test]
fn capacity_eviction_drops_oldest_joined() {
    let mut link = TestLink::new(2);
    link.join("P1");
    let p2 = link.join("P2");
    let p3 = link.join("P3");

    let records = link.records();
    let ids: Vec<_> = records.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![p2, p3]);
}

#[test]
fn world_changes_are_visible_without_a_tick() {
    // Even with a wide coalescing window, audibility changes go out promptly
    let path = region_path();
    let writer = LinkWriter::create(&path, 8).unwrap();
    let mut server = LinkServer::with_writer(writer, Duration::from_secs(3600), None);

    server.on_player_join(1, "P1");
    server.on_world_change(1, "nether");
    let view = LinkReader::open(&path).unwrap().read().unwrap();
    assert_eq!(view.records[0].world, "nether");

    // The position that arrived inside the window is deferred to end_tick
    server.on_position_tick(1, Vec3::new(5.0, 80.0, 5.0), Vec3::ZERO);
    let deferred = LinkReader::open(&path).unwrap().read().unwrap();
    assert_eq!(deferred.version, view.version);

    server.end_tick();
    let flushed = LinkReader::open(&path).unwrap().read().unwrap();
    assert_eq!(flushed.records[0].pos, [5.0, 80.0, 5.0]);

    server.shutdown().unwrap();
    let _ = std::fs::remove_file(&path);
}

#[test]
fn shutdown_clears_and_unlinks_the_region() {
    let path = region_path();
    let writer = LinkWriter::create(&path, 8).unwrap();
    let mut server = LinkServer::with_writer(writer, Duration::ZERO, None);
    server.on_player_join(1, "P1");

    // A reader holding a mapping across shutdown sees the final empty state
    let reader = LinkReader::open(&path).unwrap();
    server.shutdown().unwrap();

    let view = reader.read().unwrap();
    assert!(view.records.is_empty());
    assert!(!path.exists());
    assert!(matches!(LinkReader::open(&path), Err(LinkError::Io(_))));
}
