//! Unified error type for pairplay.

use pairplay_protocol::ProtocolError;
use pairplay_room::RoomError;
use pairplay_session::SessionError;
use pairplay_transport::TransportError;

/// Top-level error that wraps every crate-specific error.
///
/// `#[from]` on each variant lets `?` convert sub-crate errors.
#[derive(Debug, thiserror::Error)]
pub enum PairplayError {
    /// Binding, accepting, or talking to a connection failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Encoding, decoding, or a malformed room id.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A frame could not be queued for a participant.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A room refused a connection.
    #[error(transparent)]
    Room(#[from] RoomError),
}
