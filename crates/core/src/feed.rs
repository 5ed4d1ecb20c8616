//! Newline-delimited JSON event feed, the stand-in for a host game process
//! calling the ingestion API in-process.
//!
//! One event per line:
//!
//! ```text
//! {"event":"join","name":"Steve"}
//! {"event":"world","id":"<uuid>","world":"minecraft:the_nether"}
//! {"event":"teams","group":"red","policy":"same-team-only","members":["<uuid>"]}
//! {"event":"position","id":"<uuid>","pos":[0.5,64.0,0.5],"yaw":90.0,"pitch":0.0}
//! {"event":"tick"}
//! ```

use crate::server::LinkServer;
use crate::session::{IdentityId, Vec3, VisibilityPolicy};
use crate::utils::{offline_uuid, HyphenatedUUID};
use serde::Deserialize;
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FeedEvent {
    Join {
        /// Defaults to the offline uuid derived from `name`.
        id: Option<HyphenatedUUID>,
        name: String,
    },
    Leave {
        id: HyphenatedUUID,
    },
    World {
        id: HyphenatedUUID,
        world: String,
    },
    Teams {
        group: String,
        #[serde(default)]
        policy: VisibilityPolicy,
        #[serde(default)]
        members: Vec<HyphenatedUUID>,
    },
    TeamsRemove {
        group: String,
    },
    Position {
        id: HyphenatedUUID,
        pos: [f32; 3],
        front: Option<[f32; 3]>,
        yaw: Option<f32>,
        pitch: Option<f32>,
    },
    Tick,
}

impl FeedEvent {
    pub fn apply(self, server: &mut LinkServer) {
        match self {
            FeedEvent::Join { id, name } => {
                let id = id.map_or_else(|| offline_uuid(&name), |id| id.0);
                server.on_player_join(id, &name);
            }
            FeedEvent::Leave { id } => server.on_player_leave(id.0),
            FeedEvent::World { id, world } => server.on_world_change(id.0, &world),
            FeedEvent::Teams {
                group,
                policy,
                members,
            } => {
                let members: Vec<IdentityId> = members.iter().map(|m| m.0).collect();
                server.on_teams_modify(&group, &members, policy);
            }
            FeedEvent::TeamsRemove { group } => server.on_teams_remove(&group),
            FeedEvent::Position {
                id,
                pos,
                front,
                yaw,
                pitch,
            } => {
                let front = match (front, yaw, pitch) {
                    (Some(front), _, _) => Vec3::from_array(front),
                    (None, Some(yaw), Some(pitch)) => Vec3::from_yaw_pitch(yaw, pitch),
                    _ => Vec3::ZERO,
                };
                server.on_position_tick(id.0, Vec3::from_array(pos), front);
            }
            FeedEvent::Tick => server.end_tick(),
        }
    }
}

/// Applies events from `input` until EOF or `stop` is raised. Malformed
/// lines are logged and skipped, they never abort the feed.
pub fn run(server: &mut LinkServer, input: impl BufRead, stop: &AtomicBool) -> anyhow::Result<()> {
    for line in input.lines() {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<FeedEvent>(&line) {
            Ok(event) => event.apply(server),
            Err(err) => warn!("ignoring malformed feed line: {}", err),
        }
    }
    Ok(())
}
