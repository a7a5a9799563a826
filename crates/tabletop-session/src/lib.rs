//! Connection sessions for tabletop sync.
//!
//! This crate answers two questions for the server:
//!
//! 1. **Who is this?** The [`Authenticator`] trait maps a connection's
//!    opening [`Handshake`](tabletop_transport::Handshake) to a
//!    [`UserId`](tabletop_protocol::UserId). [`JwtAuthenticator`] is the
//!    shipped implementation, sharing the REST API's token rule.
//! 2. **Which rooms is it in?** A [`Session`] binds one live connection to
//!    one user and records the rooms it joined. [`SessionManager`] holds
//!    every live session, keyed by connection.
//!
//! # How it fits in the stack
//!
//! ```text
//! Room Layer (above)  ← admits sessions into rooms, keeps joined_rooms in step
//!     ↕
//! Session Layer (this crate)
//!     ↕
//! Transport / Protocol (below)  ← ConnectionId, Handshake, UserId, RoomKey
//! ```

#![allow(async_fn_in_trait)]

mod auth;
mod error;
mod manager;
mod session;

pub use auth::{Authenticator, DEFAULT_COOKIE_NAME, DEFAULT_TOKEN_TTL_SECS, JwtAuthenticator};
pub use error::SessionError;
pub use manager::SessionManager;
pub use session::Session;
