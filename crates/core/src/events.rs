use crate::session::{IdentityId, VisibilityPolicy};

/// `LinkEvent` gets rebroadcast on the server's internal bus whenever the
/// host reports a session change, so other in-process consumers can react
/// without hooking the host themselves. Position ticks are deliberately not
/// rebroadcast.
#[derive(Debug, Clone)]
pub enum LinkEvent {
    /// This event is broadcast when a player joins the link. It contains the
    /// identity id and the player's display name.
    PlayerJoined { id: IdentityId, name: String },
    /// This event is broadcast when a player leaves the link.
    PlayerLeft { id: IdentityId },
    /// This event is broadcast when a tracked player finishes transitioning
    /// to a new world.
    WorldChanged { id: IdentityId, world: String },
    /// This event is broadcast when the host resyncs a team. It carries the
    /// complete membership set, not a diff.
    TeamsModified {
        group: String,
        policy: VisibilityPolicy,
        members: Vec<IdentityId>,
    },
    /// This event is broadcast when the host removes a team.
    TeamsRemoved { group: String },
}
