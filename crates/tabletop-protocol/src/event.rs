//! Domain events: fire-and-forget notifications about committed changes.
//!
//! A [`DomainEvent`] is published by whoever performed a mutation, after
//! the store committed it. It names what happened ([`EventType`]), which
//! rooms should hear about it ([`Scope`]), and carries a JSON payload
//! whose shape depends on the event type. Events are never persisted.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::RoomKey;

/// The kinds of mutable entity events are raised for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    Campaign,
    Membership,
    Invite,
    Map,
    Token,
    Plugin,
    Notification,
}

/// Every event type the sync layer routes, rendered `<entity>/<phase>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "campaign/created")]
    CampaignCreated,
    #[serde(rename = "campaign/updated")]
    CampaignUpdated,
    #[serde(rename = "campaign/deleted")]
    CampaignDeleted,
    #[serde(rename = "campaign/reordered")]
    CampaignReordered,

    #[serde(rename = "membership/created")]
    MembershipCreated,
    #[serde(rename = "membership/updated")]
    MembershipUpdated,
    #[serde(rename = "membership/deleted")]
    MembershipDeleted,

    #[serde(rename = "invite/created")]
    InviteCreated,
    #[serde(rename = "invite/updated")]
    InviteUpdated,
    #[serde(rename = "invite/deleted")]
    InviteDeleted,

    #[serde(rename = "map/created")]
    MapCreated,
    #[serde(rename = "map/updated")]
    MapUpdated,
    #[serde(rename = "map/deleted")]
    MapDeleted,
    #[serde(rename = "map/reordered")]
    MapReordered,

    #[serde(rename = "token/created")]
    TokenCreated,
    #[serde(rename = "token/updated")]
    TokenUpdated,
    #[serde(rename = "token/deleted")]
    TokenDeleted,

    #[serde(rename = "plugin/created")]
    PluginCreated,
    #[serde(rename = "plugin/updated")]
    PluginUpdated,
    #[serde(rename = "plugin/deleted")]
    PluginDeleted,

    #[serde(rename = "notification/created")]
    NotificationCreated,
    #[serde(rename = "notification/updated")]
    NotificationUpdated,
    #[serde(rename = "notification/deleted")]
    NotificationDeleted,

    /// A transient pointer ping on a map. Never persisted.
    #[serde(rename = "map/ping")]
    MapPing,
}

impl EventType {
    /// All event types, in declaration order.
    pub const ALL: &'static [EventType] = &[
        Self::CampaignCreated,
        Self::CampaignUpdated,
        Self::CampaignDeleted,
        Self::CampaignReordered,
        Self::MembershipCreated,
        Self::MembershipUpdated,
        Self::MembershipDeleted,
        Self::InviteCreated,
        Self::InviteUpdated,
        Self::InviteDeleted,
        Self::MapCreated,
        Self::MapUpdated,
        Self::MapDeleted,
        Self::MapReordered,
        Self::TokenCreated,
        Self::TokenUpdated,
        Self::TokenDeleted,
        Self::PluginCreated,
        Self::PluginUpdated,
        Self::PluginDeleted,
        Self::NotificationCreated,
        Self::NotificationUpdated,
        Self::NotificationDeleted,
        Self::MapPing,
    ];

    /// The wire name, e.g. `"token/created"`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CampaignCreated => "campaign/created",
            Self::CampaignUpdated => "campaign/updated",
            Self::CampaignDeleted => "campaign/deleted",
            Self::CampaignReordered => "campaign/reordered",
            Self::MembershipCreated => "membership/created",
            Self::MembershipUpdated => "membership/updated",
            Self::MembershipDeleted => "membership/deleted",
            Self::InviteCreated => "invite/created",
            Self::InviteUpdated => "invite/updated",
            Self::InviteDeleted => "invite/deleted",
            Self::MapCreated => "map/created",
            Self::MapUpdated => "map/updated",
            Self::MapDeleted => "map/deleted",
            Self::MapReordered => "map/reordered",
            Self::TokenCreated => "token/created",
            Self::TokenUpdated => "token/updated",
            Self::TokenDeleted => "token/deleted",
            Self::PluginCreated => "plugin/created",
            Self::PluginUpdated => "plugin/updated",
            Self::PluginDeleted => "plugin/deleted",
            Self::NotificationCreated => "notification/created",
            Self::NotificationUpdated => "notification/updated",
            Self::NotificationDeleted => "notification/deleted",
            Self::MapPing => "map/ping",
        }
    }

    /// The entity kind this event concerns.
    pub fn entity(self) -> Entity {
        match self {
            Self::CampaignCreated
            | Self::CampaignUpdated
            | Self::CampaignDeleted
            | Self::CampaignReordered => Entity::Campaign,
            Self::MembershipCreated
            | Self::MembershipUpdated
            | Self::MembershipDeleted => Entity::Membership,
            Self::InviteCreated | Self::InviteUpdated | Self::InviteDeleted => {
                Entity::Invite
            }
            Self::MapCreated
            | Self::MapUpdated
            | Self::MapDeleted
            | Self::MapReordered
            | Self::MapPing => Entity::Map,
            Self::TokenCreated | Self::TokenUpdated | Self::TokenDeleted => {
                Entity::Token
            }
            Self::PluginCreated | Self::PluginUpdated | Self::PluginDeleted => {
                Entity::Plugin
            }
            Self::NotificationCreated
            | Self::NotificationUpdated
            | Self::NotificationDeleted => Entity::Notification,
        }
    }

    /// `true` for events that describe no persisted state.
    pub fn is_transient(self) -> bool {
        matches!(self, Self::MapPing)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The rooms an event is published to.
///
/// Always serialized as a list; a single bare key is accepted when
/// deserializing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Scope(Vec<RoomKey>);

impl Scope {
    /// The scoped room keys, in publish order.
    pub fn rooms(&self) -> &[RoomKey] {
        &self.0
    }
}

impl From<RoomKey> for Scope {
    fn from(key: RoomKey) -> Self {
        Self(vec![key])
    }
}

impl From<Vec<RoomKey>> for Scope {
    fn from(keys: Vec<RoomKey>) -> Self {
        Self(keys)
    }
}

impl<'de> Deserialize<'de> for Scope {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum OneOrMany {
            One(RoomKey),
            Many(Vec<RoomKey>),
        }

        Ok(match OneOrMany::deserialize(d)? {
            OneOrMany::One(key) => Self(vec![key]),
            OneOrMany::Many(keys) => Self(keys),
        })
    }
}

/// A change notification fanned out to the rooms in its scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    /// What happened.
    #[serde(rename = "type")]
    pub event_type: EventType,

    /// Which rooms hear about it.
    pub scope: Scope,

    /// Event-specific data. Full entities for create/update, `{ "id" }`
    /// style references for deletes, `{ "ids": [...] }` for reorders.
    #[serde(default)]
    pub payload: Value,
}

impl DomainEvent {
    /// Creates an event.
    pub fn new(
        event_type: EventType,
        scope: impl Into<Scope>,
        payload: Value,
    ) -> Self {
        Self {
            event_type,
            scope: scope.into(),
            payload,
        }
    }

    /// The scoped room keys.
    pub fn rooms(&self) -> &[RoomKey] {
        self.scope.rooms()
    }

    /// Reads a string field of the payload, e.g. `"campaignId"`.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.payload.get(name)?.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CampaignId, MapId};
    use serde_json::json;

    #[test]
    fn test_event_type_wire_names_match_serde() {
        for ty in EventType::ALL {
            let json = serde_json::to_value(ty).unwrap();
            assert_eq!(json, Value::String(ty.as_str().to_string()));
        }
    }

    #[test]
    fn test_only_ping_is_transient() {
        let transient: Vec<_> =
            EventType::ALL.iter().filter(|t| t.is_transient()).collect();
        assert_eq!(transient, vec![&EventType::MapPing]);
    }

    #[test]
    fn test_domain_event_json_shape() {
        let event = DomainEvent::new(
            EventType::TokenCreated,
            RoomKey::map(&MapId::new("7")),
            json!({ "id": "tok-9", "mapId": "7" }),
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "token/created");
        assert_eq!(json["scope"], json!(["map/7"]));
        assert_eq!(json["payload"]["id"], "tok-9");
    }

    #[test]
    fn test_scope_accepts_single_key_or_list() {
        let one: DomainEvent = serde_json::from_value(json!({
            "type": "campaign/updated",
            "scope": "campaign/42",
            "payload": { "id": "42" }
        }))
        .unwrap();
        assert_eq!(one.rooms(), &[RoomKey::campaign(&CampaignId::new("42"))]);

        let many: DomainEvent = serde_json::from_value(json!({
            "type": "membership/deleted",
            "scope": ["campaign/42", "user/u1"],
            "payload": { "userId": "u1", "campaignId": "42" }
        }))
        .unwrap();
        assert_eq!(many.rooms().len(), 2);
        assert_eq!(many.field("userId"), Some("u1"));
    }

    #[test]
    fn test_unknown_event_type_is_rejected() {
        let result: Result<DomainEvent, _> = serde_json::from_value(json!({
            "type": "dragon/summoned",
            "scope": "map/1",
            "payload": {}
        }));
        assert!(result.is_err());
    }
}
