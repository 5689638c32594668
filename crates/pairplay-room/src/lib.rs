//! Two-seat game rooms for pairplay.
//!
//! - [`Directory`]: room id → [`Room`], created on demand and removed when
//!   the room is destroyed. Backed by a sharded concurrent map so many
//!   connection tasks can look up and create rooms at once.
//! - [`Room`]: the state machine for one session. Seats participants by
//!   token, runs each connection's receive loop, dispatches commands under
//!   the room lock, and relays updates to the opponent.
//! - [`Seat`]: one of the two fixed positions, with [`Seat::opponent`].
//!
//! # Lifecycle
//!
//! ```text
//! connection ─► Directory::get_or_create(id) ─► Room::join(token, conn)
//!                                                   │ receive loop
//!                                                   ▼
//!                                               Room::dispatch
//! ```
//!
//! A room is destroyed when, after a disconnect, the other seat is empty or
//! has no live connection, or when the optional idle reaper expires it.

mod config;
mod directory;
mod error;
mod room;
mod slots;

pub use config::{RoomConfig, RoomStatus};
pub use directory::Directory;
pub use error::RoomError;
pub use room::{Room, RoomInfo, SeatInfo};
pub use slots::Seat;
