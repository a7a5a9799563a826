//! Campaign roles and the permission check built on them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tabletop_protocol::{CampaignId, UserId};
use tokio::sync::RwLock;

use crate::RoomError;

/// A user's role inside one campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    GameMaster,
    Player,
}

/// Read-only access to campaign memberships.
///
/// Implemented by whatever owns membership data (the REST API's store in
/// production, [`InMemoryRoles`] in tests). Called on every campaign join;
/// implementations must not cache on the caller's behalf.
pub trait RoleLookup: Send + Sync + 'static {
    /// Returns the user's role in the campaign, or `None` for non-members.
    fn role(
        &self,
        user: &UserId,
        campaign: &CampaignId,
    ) -> impl std::future::Future<Output = Result<Option<Role>, RoomError>> + Send;
}

/// One permission check, parametrized by the role it requires.
///
/// ```rust
/// use tabletop_room::{Role, RolePolicy};
///
/// let members = RolePolicy::any_member();
/// assert!(members.permits(Some(Role::Player)));
/// assert!(!members.permits(None));
///
/// let gm_only = RolePolicy::require(Role::GameMaster);
/// assert!(!gm_only.permits(Some(Role::Player)));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RolePolicy {
    required: Option<Role>,
}

impl RolePolicy {
    /// Any membership passes, whatever the role.
    pub const fn any_member() -> Self {
        Self { required: None }
    }

    /// Only the given role passes.
    pub const fn require(role: Role) -> Self {
        Self {
            required: Some(role),
        }
    }

    pub fn permits(&self, role: Option<Role>) -> bool {
        match (self.required, role) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(required), Some(actual)) => required == actual,
        }
    }
}

impl Default for RolePolicy {
    fn default() -> Self {
        Self::any_member()
    }
}

/// A [`RoleLookup`] backed by a map. Grants and revocations are visible to
/// the very next lookup.
#[derive(Debug, Default)]
pub struct InMemoryRoles {
    roles: RwLock<HashMap<(UserId, CampaignId), Role>>,
}

impl InMemoryRoles {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn grant(&self, user: UserId, campaign: CampaignId, role: Role) {
        self.roles.write().await.insert((user, campaign), role);
    }

    pub async fn revoke(&self, user: &UserId, campaign: &CampaignId) {
        self.roles
            .write()
            .await
            .remove(&(user.clone(), campaign.clone()));
    }
}

impl RoleLookup for InMemoryRoles {
    async fn role(
        &self,
        user: &UserId,
        campaign: &CampaignId,
    ) -> Result<Option<Role>, RoomError> {
        let roles = self.roles.read().await;
        Ok(roles.get(&(user.clone(), campaign.clone())).copied())
    }
}

impl<L: RoleLookup> RoleLookup for std::sync::Arc<L> {
    async fn role(
        &self,
        user: &UserId,
        campaign: &CampaignId,
    ) -> Result<Option<Role>, RoomError> {
        (**self).role(user, campaign).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serializes_screaming_snake_case() {
        assert_eq!(
            serde_json::to_string(&Role::GameMaster).unwrap(),
            "\"GAME_MASTER\""
        );
        let role: Role = serde_json::from_str("\"PLAYER\"").unwrap();
        assert_eq!(role, Role::Player);
    }

    #[test]
    fn test_policy_any_member_accepts_every_role() {
        let policy = RolePolicy::any_member();
        assert!(policy.permits(Some(Role::GameMaster)));
        assert!(policy.permits(Some(Role::Player)));
        assert!(!policy.permits(None));
    }

    #[test]
    fn test_policy_require_accepts_only_that_role() {
        let policy = RolePolicy::require(Role::GameMaster);
        assert!(policy.permits(Some(Role::GameMaster)));
        assert!(!policy.permits(Some(Role::Player)));
        assert!(!policy.permits(None));
    }

    #[tokio::test]
    async fn test_in_memory_roles_revoke_is_visible_immediately() {
        let roles = InMemoryRoles::new();
        let (user, campaign) = (UserId::new("u1"), CampaignId::new("42"));

        roles.grant(user.clone(), campaign.clone(), Role::Player).await;
        assert_eq!(roles.role(&user, &campaign).await.unwrap(), Some(Role::Player));

        roles.revoke(&user, &campaign).await;
        assert_eq!(roles.role(&user, &campaign).await.unwrap(), None);
    }
}
