use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use vclink_core::server::LinkServer;
use vclink_core::session::IdentityId;
use vclink_core::utils::offline_uuid;
use vclink_link::records::LinkRecord;
use vclink_link::{LinkReader, LinkWriter};

static REGION_COUNTER: AtomicU32 = AtomicU32::new(0);

pub fn region_path() -> PathBuf {
    std::env::temp_dir().join(format!(
        "vclink-it-{}-{}",
        std::process::id(),
        REGION_COUNTER.fetch_add(1, Ordering::Relaxed)
    ))
}

/// One bridge with its backing region file, removed on drop.
pub struct TestLink {
    pub server: LinkServer,
    path: PathBuf,
}

impl TestLink {
    /// A bridge over a fresh region with `capacity` slots and no position
    /// coalescing, so every event is visible immediately.
    pub fn new(capacity: usize) -> TestLink {
        let path = region_path();
        let writer = LinkWriter::create(&path, capacity).unwrap();
        TestLink {
            server: LinkServer::with_writer(writer, Duration::ZERO, None),
            path,
        }
    }

    /// Joins a player under its offline uuid and returns the id.
    pub fn join(&mut self, name: &str) -> IdentityId {
        let id = offline_uuid(name);
        self.server.on_player_join(id, name);
        id
    }

    pub fn reader(&self) -> LinkReader {
        LinkReader::open(&self.path).unwrap()
    }

    pub fn records(&self) -> Vec<LinkRecord> {
        self.reader().read().unwrap().records
    }
}

impl Drop for TestLink {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
