//! Join authorization, per room kind.
//!
//! Authorization is the async half of a join. It runs without touching room
//! state and yields an [`Admission`], which the
//! [`MembershipAuthority`](crate::MembershipAuthority) then applies under
//! whatever lock protects the rooms.

use tabletop_protocol::{CampaignId, RoomKey, RoomKind, UserId};

use crate::{RoleLookup, RolePolicy};

/// Proof that `user` passed the join check for `room`.
///
/// Only [`JoinPolicy::authorize`] builds one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    user: UserId,
    room: RoomKey,
}

impl Admission {
    pub fn user(&self) -> &UserId {
        &self.user
    }

    pub fn room(&self) -> &RoomKey {
        &self.room
    }
}

/// Decides who may join which room.
///
/// - `user/<id>`: only the user `<id>` itself
/// - `campaign/<id>`: anyone the [`RolePolicy`] accepts, asked fresh on
///   every attempt
/// - `map/<id>`: anyone
#[derive(Debug)]
pub struct JoinPolicy<L> {
    roles: L,
    campaign: RolePolicy,
}

impl<L: RoleLookup> JoinPolicy<L> {
    /// Campaign rooms admit any member.
    pub fn new(roles: L) -> Self {
        Self::with_campaign_policy(roles, RolePolicy::any_member())
    }

    pub fn with_campaign_policy(roles: L, campaign: RolePolicy) -> Self {
        Self { roles, campaign }
    }

    pub fn roles(&self) -> &L {
        &self.roles
    }

    /// Returns an [`Admission`] if `user` may join `room`, `None` otherwise.
    pub async fn authorize(&self, user: &UserId, room: &RoomKey) -> Option<Admission> {
        let allowed = match room.kind() {
            RoomKind::User => room.id() == user.as_str(),
            RoomKind::Campaign => {
                let campaign = CampaignId::new(room.id());
                match self.roles.role(user, &campaign).await {
                    Ok(role) => self.campaign.permits(role),
                    Err(e) => {
                        tracing::warn!(%user, %room, error = %e, "role lookup failed");
                        false
                    }
                }
            }
            RoomKind::Map => true,
        };

        allowed.then(|| Admission {
            user: user.clone(),
            room: room.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InMemoryRoles, Role};
    use tabletop_protocol::MapId;

    async fn policy() -> JoinPolicy<InMemoryRoles> {
        let roles = InMemoryRoles::new();
        roles
            .grant(UserId::new("gm"), CampaignId::new("42"), Role::GameMaster)
            .await;
        roles
            .grant(UserId::new("pc"), CampaignId::new("42"), Role::Player)
            .await;
        JoinPolicy::new(roles)
    }

    #[tokio::test]
    async fn test_authorize_own_user_room_only() {
        let policy = policy().await;
        let me = UserId::new("pc");

        assert!(policy.authorize(&me, &RoomKey::user(&me)).await.is_some());
        assert!(policy
            .authorize(&me, &RoomKey::user(&UserId::new("gm")))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_authorize_campaign_requires_membership() {
        let policy = policy().await;
        let room = RoomKey::campaign(&CampaignId::new("42"));

        assert!(policy.authorize(&UserId::new("gm"), &room).await.is_some());
        assert!(policy.authorize(&UserId::new("pc"), &room).await.is_some());
        assert!(policy.authorize(&UserId::new("stranger"), &room).await.is_none());
    }

    #[tokio::test]
    async fn test_authorize_campaign_with_required_role() {
        let roles = InMemoryRoles::new();
        roles
            .grant(UserId::new("pc"), CampaignId::new("42"), Role::Player)
            .await;
        let policy = JoinPolicy::with_campaign_policy(roles, RolePolicy::require(Role::GameMaster));

        let room = RoomKey::campaign(&CampaignId::new("42"));
        assert!(policy.authorize(&UserId::new("pc"), &room).await.is_none());
    }

    #[tokio::test]
    async fn test_authorize_campaign_sees_revocation() {
        let policy = policy().await;
        let pc = UserId::new("pc");
        let room = RoomKey::campaign(&CampaignId::new("42"));
        assert!(policy.authorize(&pc, &room).await.is_some());

        policy.roles().revoke(&pc, &CampaignId::new("42")).await;

        assert!(policy.authorize(&pc, &room).await.is_none());
    }

    #[tokio::test]
    async fn test_authorize_map_is_open() {
        let policy = policy().await;
        let room = RoomKey::map(&MapId::new("7"));
        let admission = policy.authorize(&UserId::new("anyone"), &room).await.unwrap();
        assert_eq!(admission.room(), &room);
    }
}
