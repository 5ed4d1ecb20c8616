use crate::context;
use crate::publish::{Publisher, Snapshot};
use crate::session::{IdentityId, SessionRegistry, Vec3, VisibilityPolicy};
use std::time::Duration;
use tracing::{debug, warn};
use vclink_link::{LinkError, LinkWriter};

/// Translates host events into registry mutations, context recomputes and
/// publish requests. Every error is absorbed here: a failure in the link
/// path must never propagate back into the host's event dispatch.
pub struct Ingestor {
    registry: SessionRegistry,
    publisher: Publisher,
}

impl Ingestor {
    pub fn new(writer: LinkWriter, coalesce_window: Duration) -> Ingestor {
        Ingestor {
            registry: SessionRegistry::new(),
            publisher: Publisher::new(writer, coalesce_window),
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn version(&self) -> u64 {
        self.publisher.version()
    }

    pub fn on_player_join(&mut self, id: IdentityId, name: &str) {
        self.registry
            .upsert_identity(id, name, Vec3::ZERO, Vec3::ZERO, "");
        context::resolve_identity(&mut self.registry, id);
        self.publish_now();
    }

    pub fn on_player_leave(&mut self, id: IdentityId) {
        if self.registry.remove_identity(id).is_none() {
            debug!("dropping leave event for unregistered identity {:032x}", id);
            return;
        }
        self.publish_now();
    }

    pub fn on_world_change(&mut self, id: IdentityId, world: &str) {
        match self.registry.set_world(id, world) {
            Ok(()) => {
                context::resolve_identity(&mut self.registry, id);
                self.publish_now();
            }
            Err(err) => debug!("dropping world change: {}", err),
        }
    }

    pub fn on_teams_modify(
        &mut self,
        group: &str,
        members: &[IdentityId],
        policy: VisibilityPolicy,
    ) {
        self.registry
            .upsert_group(group, policy, members.iter().copied());
        // Team changes can re-partition audibility for many identities
        context::resolve_all(&mut self.registry);
        self.publish_now();
    }

    pub fn on_teams_remove(&mut self, group: &str) {
        if !self.registry.remove_group(group) {
            debug!("dropping remove event for unknown group {}", group);
            return;
        }
        context::resolve_all(&mut self.registry);
        self.publish_now();
    }

    /// High-frequency path. Context is world/group derived, so position
    /// changes never trigger a recompute, and publishes are coalesced.
    pub fn on_position_tick(&mut self, id: IdentityId, pos: Vec3, front: Vec3) {
        match self.registry.set_position(id, pos, front) {
            Ok(()) => {
                if self.publisher.ready() {
                    self.publish_now();
                } else {
                    self.publisher.mark_pending();
                }
            }
            Err(err) => debug!("dropping position tick: {}", err),
        }
    }

    /// Host end-of-tick hook; flushes a coalesced publish if one is due.
    pub fn end_tick(&mut self) {
        if self.publisher.take_pending() {
            self.publish_now();
        }
    }

    /// Drops all session state and publishes the resulting empty snapshot so
    /// readers see every identity leave.
    pub fn clear(&mut self) {
        self.registry.clear();
        self.publish_now();
    }

    pub fn into_writer(self) -> LinkWriter {
        self.publisher.into_writer()
    }

    fn publish_now(&mut self) {
        let snapshot = Snapshot::capture(&self.registry, self.publisher.capacity());
        match self.publisher.publish(&snapshot) {
            Ok(_) => {}
            Err(err @ LinkError::BufferOverflow { .. }) => warn!("link publish degraded: {}", err),
            Err(err) => warn!("link publish failed: {}", err),
        }
    }
}
