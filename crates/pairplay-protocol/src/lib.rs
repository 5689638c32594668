//! Wire protocol for pairplay.
//!
//! This crate defines what the browser client and the server exchange:
//!
//! - **Types** ([`ClientMessage`], [`ServerMessage`], [`GameData`], ...):
//!   JSON objects with integer codes.
//! - **Identifiers** ([`RoomId`], [`PlayerToken`]): room ids in the
//!   20-character xid text form, and opaque reconnection tokens.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): bytes to types and back.
//! - **Errors** ([`ProtocolError`]).
//!
//! ```text
//! Transport (bytes) → Protocol (ClientMessage) → Room (dispatch)
//! ```

mod codec;
mod error;
mod room_id;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use room_id::RoomId;
pub use types::{
    ClientMessage, CloseReason, Command, GameData, GameStatus, PlayerToken,
    ServerCode, ServerMessage, TetrisSprite,
};
