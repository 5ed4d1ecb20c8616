use crate::session::SessionRegistry;
use std::time::{Duration, Instant};
use vclink_link::records::LinkRecord;
use vclink_link::{LinkError, LinkWriter};

/// An immutable copy of every identity record for one publish cycle. Every
/// record reflects the group and world state at the instant of capture.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub records: Vec<LinkRecord>,
    /// Identities that did not fit the region and were dropped, oldest
    /// joined first.
    pub evicted: usize,
}

impl Snapshot {
    pub fn capture(registry: &SessionRegistry, capacity: usize) -> Snapshot {
        let evicted = registry.len().saturating_sub(capacity);
        let records = registry
            .identities()
            .skip(evicted)
            .map(|ident| LinkRecord {
                id: ident.id,
                name: ident.name.clone(),
                pos: ident.pos.to_array(),
                front: ident.front.to_array(),
                world: ident.world.clone(),
                token: ident.context.token.clone(),
            })
            .collect();
        Snapshot { records, evicted }
    }
}

/// Writes snapshots into the link region under a monotonically increasing
/// version. Owns the region writer; never touches live registry state.
pub struct Publisher {
    writer: LinkWriter,
    version: u64,
    coalesce_window: Duration,
    last_publish: Option<Instant>,
    pending: bool,
}

impl Publisher {
    pub fn new(writer: LinkWriter, coalesce_window: Duration) -> Publisher {
        Publisher {
            writer,
            version: 0,
            coalesce_window,
            last_publish: None,
            pending: false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.writer.capacity()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Writes `snapshot` under the next version. An unchanged snapshot still
    /// gets a fresh version so readers can detect staleness, the record
    /// payload stays byte-identical.
    ///
    /// `BufferOverflow` reports that the truncated snapshot WAS written;
    /// readers stay fresh, the caller decides how loudly to complain.
    pub fn publish(&mut self, snapshot: &Snapshot) -> Result<u64, LinkError> {
        self.version += 1;
        self.writer.write(self.version, &snapshot.records);
        self.last_publish = Some(Instant::now());
        self.pending = false;
        if snapshot.evicted > 0 {
            return Err(LinkError::BufferOverflow {
                evicted: snapshot.evicted,
            });
        }
        Ok(self.version)
    }

    /// True once the coalescing window since the last publish has elapsed.
    /// Non-position publishes skip this check entirely.
    pub fn ready(&self) -> bool {
        self.last_publish
            .map_or(true, |at| at.elapsed() >= self.coalesce_window)
    }

    pub fn mark_pending(&mut self) {
        self.pending = true;
    }

    pub fn take_pending(&mut self) -> bool {
        std::mem::take(&mut self.pending)
    }

    pub fn into_writer(self) -> LinkWriter {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context;
    use crate::session::Vec3;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};
    use vclink_link::LinkReader;

    static REGION_COUNTER: AtomicU32 = AtomicU32::new(0);

    struct Region(PathBuf);

    impl Region {
        fn new() -> Region {
            Region(std::env::temp_dir().join(format!(
                "vclink-publish-test-{}-{}",
                std::process::id(),
                REGION_COUNTER.fetch_add(1, Ordering::Relaxed)
            )))
        }
    }

    impl Drop for Region {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.0);
        }
    }

    fn registry_of(names: &[&str]) -> SessionRegistry {
        let mut registry = SessionRegistry::new();
        for (id, name) in names.iter().enumerate() {
            registry.upsert_identity(id as u128 + 1, name, Vec3::ZERO, Vec3::ZERO, "overworld");
        }
        context::resolve_all(&mut registry);
        registry
    }

    #[test]
    fn capture_preserves_join_order() {
        let registry = registry_of(&["a", "b", "c"]);
        let snapshot = Snapshot::capture(&registry, 8);
        assert_eq!(snapshot.evicted, 0);
        let names: Vec<_> = snapshot.records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn capture_evicts_oldest_joined_first() {
        let registry = registry_of(&["a", "b", "c"]);
        let snapshot = Snapshot::capture(&registry, 2);
        assert_eq!(snapshot.evicted, 1);
        let names: Vec<_> = snapshot.records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["b", "c"]);
    }

    #[test]
    fn republishing_bumps_version_not_payload() {
        let region = Region::new();
        let mut publisher =
            Publisher::new(LinkWriter::create(&region.0, 8).unwrap(), Duration::ZERO);
        let registry = registry_of(&["a", "b"]);
        let snapshot = Snapshot::capture(&registry, 8);

        let reader = LinkReader::open(&region.0).unwrap();
        let v1 = publisher.publish(&snapshot).unwrap();
        let first = reader.read().unwrap();
        let v2 = publisher.publish(&snapshot).unwrap();
        let second = reader.read().unwrap();

        assert_eq!((v1, v2), (1, 2));
        assert_eq!((first.version, second.version), (1, 2));
        assert_eq!(first.records, second.records);
    }

    #[test]
    fn overflow_is_reported_but_still_published() {
        let region = Region::new();
        let mut publisher =
            Publisher::new(LinkWriter::create(&region.0, 2).unwrap(), Duration::ZERO);
        let registry = registry_of(&["a", "b", "c"]);
        let snapshot = Snapshot::capture(&registry, 2);

        assert!(matches!(
            publisher.publish(&snapshot),
            Err(LinkError::BufferOverflow { evicted: 1 })
        ));
        let view = LinkReader::open(&region.0).unwrap().read().unwrap();
        assert_eq!(view.records.len(), 2);
        assert_eq!(view.records[0].name, "b");
    }

    #[test]
    fn coalescing_window_gates_readiness() {
        let region = Region::new();
        let mut publisher = Publisher::new(
            LinkWriter::create(&region.0, 8).unwrap(),
            Duration::from_secs(3600),
        );
        assert!(publisher.ready());

        let registry = registry_of(&["a"]);
        publisher
            .publish(&Snapshot::capture(&registry, 8))
            .unwrap();
        assert!(!publisher.ready());

        assert!(!publisher.take_pending());
        publisher.mark_pending();
        assert!(publisher.take_pending());
        assert!(!publisher.take_pending());
    }
}
