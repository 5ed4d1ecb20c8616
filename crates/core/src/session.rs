use crate::context::Context;
use crate::utils::HyphenatedUUID;
use indexmap::IndexMap;
use rustc_hash::{FxBuildHasher, FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub type IdentityId = u128;

type FxIndexMap<K, V> = IndexMap<K, V, FxBuildHasher>;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("identity {0} is not registered")]
    UnknownIdentity(HyphenatedUUID),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Vec3 {
        Vec3 { x, y, z }
    }

    pub fn from_array([x, y, z]: [f32; 3]) -> Vec3 {
        Vec3 { x, y, z }
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }

    /// Unit facing vector for a head rotation in degrees, using the
    /// convention of yaw 0 looking towards +z and pitch -90 straight up.
    pub fn from_yaw_pitch(yaw: f32, pitch: f32) -> Vec3 {
        let (yaw, pitch) = (yaw.to_radians(), pitch.to_radians());
        Vec3 {
            x: -yaw.sin() * pitch.cos(),
            y: -pitch.sin(),
            z: yaw.cos() * pitch.cos(),
        }
    }
}

impl fmt::Display for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Controls who can hear the members of a group.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VisibilityPolicy {
    /// Audible to everyone in the same world.
    #[default]
    All,
    /// Audible to teammates only.
    SameTeamOnly,
    /// Audible to teammates only, hostile teams are shut out.
    HostileExcluded,
}

/// A tracked player. Created on join, destroyed on leave; the registry is
/// the only owner.
#[derive(Clone, Debug)]
pub struct Identity {
    pub id: IdentityId,
    pub name: String,
    pub pos: Vec3,
    pub front: Vec3,
    pub world: String,
    /// Maintained by the context resolver, not by registry mutations.
    pub context: Context,
}

#[derive(Debug)]
pub struct Group {
    pub policy: VisibilityPolicy,
    pub members: FxHashSet<IdentityId>,
    /// Upsert ordering, used to break ties when racing events leave an
    /// identity listed in several groups at once.
    epoch: u64,
}

/// Owns all identity and group state for one host process. Identities
/// iterate in join order, which is what capacity eviction keys off.
#[derive(Default)]
pub struct SessionRegistry {
    identities: FxIndexMap<IdentityId, Identity>,
    groups: FxHashMap<String, Group>,
    group_epoch: u64,
}

impl SessionRegistry {
    pub fn new() -> SessionRegistry {
        Default::default()
    }

    /// Creates or updates an identity. Updates keep the original join slot.
    pub fn upsert_identity(
        &mut self,
        id: IdentityId,
        name: &str,
        pos: Vec3,
        front: Vec3,
        world: &str,
    ) {
        match self.identities.get_mut(&id) {
            Some(ident) => {
                ident.name = name.to_string();
                ident.pos = pos;
                ident.front = front;
                ident.world = world.to_string();
            }
            None => {
                self.identities.insert(
                    id,
                    Identity {
                        id,
                        name: name.to_string(),
                        pos,
                        front,
                        world: world.to_string(),
                        context: Context::default(),
                    },
                );
            }
        }
    }

    /// Removes an identity and purges it from every group. No-op when the
    /// identity was never registered.
    pub fn remove_identity(&mut self, id: IdentityId) -> Option<Identity> {
        let removed = self.identities.shift_remove(&id);
        if removed.is_some() {
            for group in self.groups.values_mut() {
                group.members.remove(&id);
            }
        }
        removed
    }

    pub fn set_position(
        &mut self,
        id: IdentityId,
        pos: Vec3,
        front: Vec3,
    ) -> Result<(), SessionError> {
        let ident = self
            .identities
            .get_mut(&id)
            .ok_or(SessionError::UnknownIdentity(HyphenatedUUID(id)))?;
        ident.pos = pos;
        ident.front = front;
        Ok(())
    }

    pub fn set_world(&mut self, id: IdentityId, world: &str) -> Result<(), SessionError> {
        let ident = self
            .identities
            .get_mut(&id)
            .ok_or(SessionError::UnknownIdentity(HyphenatedUUID(id)))?;
        ident.world = world.to_string();
        Ok(())
    }

    /// Replaces a group's membership wholesale. Hosts resync the complete
    /// set on every team change, so there is no incremental form.
    pub fn upsert_group(
        &mut self,
        name: &str,
        policy: VisibilityPolicy,
        members: impl IntoIterator<Item = IdentityId>,
    ) {
        self.group_epoch += 1;
        self.groups.insert(
            name.to_string(),
            Group {
                policy,
                members: members.into_iter().collect(),
                epoch: self.group_epoch,
            },
        );
    }

    pub fn remove_group(&mut self, name: &str) -> bool {
        self.groups.remove(name).is_some()
    }

    /// The group an identity effectively belongs to. When racing events
    /// leave it listed in several groups, the most recently upserted one
    /// wins.
    pub fn effective_group(&self, id: IdentityId) -> Option<(&str, VisibilityPolicy)> {
        self.groups
            .iter()
            .filter(|(_, group)| group.members.contains(&id))
            .max_by_key(|(_, group)| group.epoch)
            .map(|(name, group)| (name.as_str(), group.policy))
    }

    /// Current members of a group. Ids that no longer resolve to a
    /// registered identity are pruned here.
    pub fn members_of(&mut self, name: &str) -> Vec<IdentityId> {
        let identities = &self.identities;
        match self.groups.get_mut(name) {
            Some(group) => {
                group.members.retain(|id| identities.contains_key(id));
                group.members.iter().copied().collect()
            }
            None => Vec::new(),
        }
    }

    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.get(name)
    }

    pub fn get(&self, id: IdentityId) -> Option<&Identity> {
        self.identities.get(&id)
    }

    pub(crate) fn set_context(&mut self, id: IdentityId, context: Context) {
        if let Some(ident) = self.identities.get_mut(&id) {
            ident.context = context;
        }
    }

    /// Identities in join order, oldest first.
    pub fn identities(&self) -> impl Iterator<Item = &Identity> {
        self.identities.values()
    }

    pub fn ids(&self) -> Vec<IdentityId> {
        self.identities.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn clear(&mut self) {
        self.identities.clear();
        self.groups.clear();
    }
}
