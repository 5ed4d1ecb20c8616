use crate::session::{IdentityId, SessionRegistry, VisibilityPolicy};

/// Token carried by every member of a policy-`all` group. Matches any other
/// token in the same world.
pub const WILDCARD_TOKEN: &str = "*";

/// The derived audio scope of one identity: which world it is in and which
/// visibility token partitions it. Readers compare these, they never see
/// groups directly.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Context {
    pub world: String,
    pub token: String,
}

/// Two identities hear each other iff they share a world and their tokens
/// match, where the wildcard token matches everything.
pub fn audible(a: &Context, b: &Context) -> bool {
    a.world == b.world
        && (a.token == b.token || a.token == WILDCARD_TOKEN || b.token == WILDCARD_TOKEN)
}

/// Bucket token for identities with no group. Per world, and distinct from
/// the wildcard: ungrouped players only hear each other.
fn ungrouped_token(world: &str) -> String {
    format!("~{}", world)
}

fn policy_token(policy: VisibilityPolicy, group: &str) -> String {
    match policy {
        VisibilityPolicy::All => WILDCARD_TOKEN.to_string(),
        // Token equality cannot express "everyone except hostiles", so
        // hostile-excluded scopes down to teammates.
        VisibilityPolicy::SameTeamOnly | VisibilityPolicy::HostileExcluded => group.to_string(),
    }
}

/// Recomputes every identity's context. Idempotent; last writer wins at the
/// field level.
pub fn resolve_all(registry: &mut SessionRegistry) {
    for id in registry.ids() {
        resolve_one(registry, id);
    }
}

/// Recomputes one identity and, when it is grouped, its group peers.
pub fn resolve_identity(registry: &mut SessionRegistry, id: IdentityId) {
    resolve_one(registry, id);
    let group = registry.effective_group(id).map(|(name, _)| name.to_string());
    if let Some(name) = group {
        for peer in registry.members_of(&name) {
            if peer != id {
                resolve_one(registry, peer);
            }
        }
    }
}

fn resolve_one(registry: &mut SessionRegistry, id: IdentityId) {
    // World ids are opaque: unknown or malformed ones simply become their
    // own bucket, the host can add worlds at any time.
    let Some(world) = registry.get(id).map(|ident| ident.world.clone()) else {
        return;
    };
    let token = match registry.effective_group(id) {
        Some((name, policy)) => policy_token(policy, name),
        None => ungrouped_token(&world),
    };
    registry.set_context(id, Context { world, token });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Vec3;
    use std::collections::HashMap;
    use vclink_utils::map;

    fn registry() -> SessionRegistry {
        let mut registry = SessionRegistry::new();
        for (id, name) in [(1, "p1"), (2, "p2"), (3, "p3"), (4, "p4")] {
            registry.upsert_identity(id, name, Vec3::ZERO, Vec3::ZERO, "overworld");
        }
        registry
    }

    fn context(registry: &SessionRegistry, id: IdentityId) -> Context {
        registry.get(id).unwrap().context.clone()
    }

    #[test]
    fn tokens_follow_policy() {
        let mut registry = registry();
        registry.upsert_group("red", VisibilityPolicy::SameTeamOnly, [1]);
        registry.upsert_group("lobby", VisibilityPolicy::All, [2]);
        resolve_all(&mut registry);

        let expected: HashMap<IdentityId, &str> = map! {
            1u128 => "red",
            2u128 => WILDCARD_TOKEN,
            3u128 => "~overworld"
        };
        for (id, token) in expected {
            assert_eq!(context(&registry, id).token, token);
        }
    }

    #[test]
    fn same_team_is_audible_other_team_is_not() {
        let mut registry = registry();
        registry.upsert_group("red", VisibilityPolicy::SameTeamOnly, [1, 2]);
        registry.upsert_group("blue", VisibilityPolicy::SameTeamOnly, [3]);
        resolve_all(&mut registry);

        assert!(audible(&context(&registry, 1), &context(&registry, 2)));
        assert!(!audible(&context(&registry, 1), &context(&registry, 3)));
    }

    #[test]
    fn ungrouped_players_share_a_world_bucket() {
        let mut registry = registry();
        registry.upsert_group("red", VisibilityPolicy::SameTeamOnly, [1]);
        resolve_all(&mut registry);

        // 3 and 4 are ungrouped: audible to each other, not to team red
        assert!(audible(&context(&registry, 3), &context(&registry, 4)));
        assert!(!audible(&context(&registry, 3), &context(&registry, 1)));
    }

    #[test]
    fn policy_all_reaches_everyone_in_world() {
        let mut registry = registry();
        registry.upsert_group("red", VisibilityPolicy::SameTeamOnly, [1]);
        registry.upsert_group("lobby", VisibilityPolicy::All, [2]);
        resolve_all(&mut registry);

        assert!(audible(&context(&registry, 2), &context(&registry, 1)));
        assert!(audible(&context(&registry, 2), &context(&registry, 3)));
    }

    #[test]
    fn worlds_never_mix() {
        let mut registry = registry();
        registry.upsert_group("lobby", VisibilityPolicy::All, [1, 2]);
        resolve_all(&mut registry);
        registry.set_world(2, "nether").unwrap();
        resolve_identity(&mut registry, 2);

        assert!(!audible(&context(&registry, 1), &context(&registry, 2)));
        assert!(!audible(&context(&registry, 3), &context(&registry, 2)));
    }

    #[test]
    fn hostile_excluded_keeps_teammates_only() {
        let mut registry = registry();
        registry.upsert_group("raiders", VisibilityPolicy::HostileExcluded, [1, 2]);
        resolve_all(&mut registry);

        assert!(audible(&context(&registry, 1), &context(&registry, 2)));
        assert!(!audible(&context(&registry, 1), &context(&registry, 3)));
    }

    #[test]
    fn world_change_moves_the_ungrouped_bucket() {
        let mut registry = registry();
        resolve_all(&mut registry);
        registry.set_world(3, "the_end").unwrap();
        resolve_identity(&mut registry, 3);

        assert_eq!(context(&registry, 3).world, "the_end");
        assert_eq!(context(&registry, 3).token, "~the_end");
        assert!(!audible(&context(&registry, 3), &context(&registry, 4)));
    }
}
