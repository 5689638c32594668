//! Error types for the room layer.

use pairplay_protocol::RoomId;

use crate::RoomStatus;

/// Why a room refused a participant.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The requested id is not a valid room id.
    #[error("invalid room id: {0}")]
    InvalidRoomId(#[from] pairplay_protocol::ProtocolError),

    /// Both seats are taken by other tokens.
    #[error("room {0} is full")]
    Full(RoomId),

    /// The room has started or ended and no longer takes joins.
    #[error("room {0} is {1}, not accepting joins")]
    NotJoinable(RoomId, RoomStatus),

    /// The room has been torn down.
    #[error("room {0} has been destroyed")]
    Destroyed(RoomId),
}
