//! Wire protocol for tabletop sync.
//!
//! This crate defines what clients and servers say to each other:
//!
//! - **Ids and room keys** ([`UserId`], [`CampaignId`], [`MapId`],
//!   [`RoomKey`]): the typed names rooms are built from.
//! - **Domain events** ([`DomainEvent`], [`EventType`], [`Scope`]):
//!   change notifications fanned out to rooms.
//! - **Frames** ([`ClientFrame`], [`ServerFrame`]): the messages on the
//!   socket.
//! - **Codec** ([`Codec`], [`JsonCodec`]): how frames become bytes.
//!
//! ```text
//! Transport (bytes) → Protocol (frames) → Session / Rooms
//! ```

mod codec;
mod error;
mod event;
mod frame;
mod ids;
mod room_key;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use event::{DomainEvent, Entity, EventType, Scope};
pub use frame::{ClientFrame, ServerFrame};
pub use ids::{CampaignId, MapId, UserId};
pub use room_key::{room_key, RoomKey, RoomKind};
