//! Error types for the session layer.

use pairplay_transport::ConnectionId;

/// Why a frame could not be handed to a participant.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The outbound queue is at capacity; the frame was dropped.
    /// The participant is reading slower than the room is producing.
    #[error("outbound queue full for {0}")]
    QueueFull(ConnectionId),

    /// The writer task has stopped, after a write error, a missed write
    /// deadline, or a close.
    #[error("channel closed for {0}")]
    ChannelClosed(ConnectionId),
}
