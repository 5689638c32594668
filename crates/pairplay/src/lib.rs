//! # pairplay
//!
//! A session server that pairs two browser clients into a game room and
//! relays their state to each other.
//!
//! Clients connect to `ws://host/ws/tetris/<room-id>`. The first two
//! distinct `token` cookies to reach a room get its two seats; a client
//! that reconnects with the same cookie gets its seat back while the room
//! is still waiting. Once both send Start the game runs, and every update
//! from one seat is forwarded to the other.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pairplay::prelude::*;
//!
//! # async fn run() -> Result<(), PairplayError> {
//! let server = PairplayServer::builder()
//!     .bind("0.0.0.0:8100")
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```
//!
//! The layers are usable on their own: [`room`] works with any
//! [`transport::Connection`], and [`transport::MemoryConnection`] drives
//! rooms without a socket.

mod error;
mod handler;
mod server;

pub use error::PairplayError;
pub use server::{PairplayServer, PairplayServerBuilder, DEFAULT_PATH_PREFIX};

pub use pairplay_protocol as protocol;
pub use pairplay_room as room;
pub use pairplay_session as session;
pub use pairplay_transport as transport;

/// The types most servers need.
pub mod prelude {
    pub use crate::{PairplayError, PairplayServer, PairplayServerBuilder};
    pub use pairplay_protocol::RoomId;
    pub use pairplay_room::RoomConfig;
    pub use pairplay_session::SessionConfig;
}
