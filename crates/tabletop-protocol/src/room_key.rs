//! Typed room keys.
//!
//! A room is named `<namespace>/<id>`. Room keys are only ever built from a
//! [`RoomKind`] plus an id (or parsed and validated from the wire), so a
//! misspelled namespace can't silently create a room nobody else joins.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{CampaignId, MapId, ProtocolError, UserId};

/// The namespace part of a room key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomKind {
    /// Per-user room: notifications and the user's own campaign list.
    User,
    /// Per-campaign room: campaign, membership, invite, map and plugin events.
    Campaign,
    /// Per-map room: token events and pointer pings.
    Map,
}

impl RoomKind {
    /// The namespace string used on the wire.
    pub fn namespace(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Campaign => "campaign",
            Self::Map => "map",
        }
    }

    fn from_namespace(ns: &str) -> Option<Self> {
        match ns {
            "user" => Some(Self::User),
            "campaign" => Some(Self::Campaign),
            "map" => Some(Self::Map),
            _ => None,
        }
    }
}

impl fmt::Display for RoomKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.namespace())
    }
}

/// The name of a room: a [`RoomKind`] and an entity id.
///
/// Serialized as the string `"<namespace>/<id>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomKey {
    kind: RoomKind,
    id: String,
}

/// Builds a room key from a kind and a raw id.
pub fn room_key(kind: RoomKind, id: impl Into<String>) -> Result<RoomKey, ProtocolError> {
    RoomKey::new(kind, id)
}

fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && !id.contains('/')
}

impl RoomKey {
    /// Builds a room key from a kind and a raw id.
    ///
    /// # Errors
    /// [`ProtocolError::InvalidRoomKey`] if `id` is empty or contains `/`.
    /// Such a key would render to a string [`parse`](Self::parse) rejects.
    pub fn new(kind: RoomKind, id: impl Into<String>) -> Result<Self, ProtocolError> {
        let id = id.into();
        if !is_valid_id(&id) {
            return Err(ProtocolError::InvalidRoomKey(format!("{kind}/{id}")));
        }
        Ok(Self { kind, id })
    }

    /// For ids that come from the typed newtypes, which the persistence
    /// layer mints non-empty and slash-free.
    fn from_entity(kind: RoomKind, id: &str) -> Self {
        debug_assert!(is_valid_id(id), "invalid room id {id:?}");
        Self {
            kind,
            id: id.to_owned(),
        }
    }

    /// `user/<id>`
    pub fn user(id: &UserId) -> Self {
        Self::from_entity(RoomKind::User, id.as_str())
    }

    /// `campaign/<id>`
    pub fn campaign(id: &CampaignId) -> Self {
        Self::from_entity(RoomKind::Campaign, id.as_str())
    }

    /// `map/<id>`
    pub fn map(id: &MapId) -> Self {
        Self::from_entity(RoomKind::Map, id.as_str())
    }

    /// The room's namespace.
    pub fn kind(&self) -> RoomKind {
        self.kind
    }

    /// The entity id part of the key.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Parses `"<namespace>/<id>"`.
    ///
    /// The id must be non-empty and contain no further `/`.
    pub fn parse(s: &str) -> Result<Self, ProtocolError> {
        let (ns, id) = s
            .split_once('/')
            .ok_or_else(|| ProtocolError::InvalidRoomKey(s.to_string()))?;
        let kind = RoomKind::from_namespace(ns)
            .ok_or_else(|| ProtocolError::InvalidRoomKey(s.to_string()))?;
        Self::new(kind, id).map_err(|_| ProtocolError::InvalidRoomKey(s.to_string()))
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

impl FromStr for RoomKey {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RoomKey {
    type Error = ProtocolError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<RoomKey> for String {
    fn from(key: RoomKey) -> Self {
        key.to_string()
    }
}
