//! Room membership and fan-out for tabletop sync.
//!
//! A room is a named set of live connections authorized to hear about one
//! entity. Rooms are never created explicitly: the first admitted join
//! creates one and the last leave deletes it.
//!
//! # Key types
//!
//! - [`JoinPolicy`]: decides whether a user may join a room, asking the
//!   [`RoleLookup`] collaborator through a [`RolePolicy`]
//! - [`MembershipAuthority`]: admits, removes and disconnects sessions,
//!   keeping `Session::joined_rooms` and the [`RoomRegistry`] in step
//! - [`BroadcastRouter`]: per-connection bounded queues and best-effort
//!   fan-out of domain events

#![allow(async_fn_in_trait)]

mod authority;
mod error;
mod policy;
mod registry;
mod role;
mod router;

pub use authority::{JoinOutcome, MembershipAuthority};
pub use error::RoomError;
pub use policy::{Admission, JoinPolicy};
pub use registry::{LocalRoomRegistry, RoomRegistry};
pub use role::{InMemoryRoles, Role, RoleLookup, RolePolicy};
pub use router::{BroadcastRouter, OutboundReceiver, PublishReport, DEFAULT_OUTBOUND_CAPACITY};
