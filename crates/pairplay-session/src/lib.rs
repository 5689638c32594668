//! Participant delivery channels for pairplay.
//!
//! A room never writes to a socket directly. Each seated participant gets a
//! [`ParticipantChannel`]: a bounded outbound queue drained by its own
//! writer task, which applies a write deadline to every frame. A room can
//! therefore hand a frame to a participant while holding its lock without
//! ever waiting on the network.
//!
//! # How it fits in the stack
//!
//! ```text
//! Room Layer (above)        ← seats hold a ParticipantChannel
//!     ↕
//! Session Layer (this crate) ← queueing, write deadlines, close
//!     ↕
//! Transport Layer (below)   ← Connection::send / close
//! ```

mod channel;
mod config;
mod error;

pub use channel::ParticipantChannel;
pub use config::SessionConfig;
pub use error::SessionError;
