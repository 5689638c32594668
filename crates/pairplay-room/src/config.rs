//! Room configuration and status machine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// RoomConfig
// ---------------------------------------------------------------------------

/// Configuration shared by every room in a [`Directory`](crate::Directory).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    /// Destroy rooms that saw no join and no inbound message for this long.
    ///
    /// `None` (the default) disables the idle reaper; rooms then live until
    /// their participants leave.
    pub idle_timeout: Option<Duration>,

    /// How often the idle reaper scans the directory.
    ///
    /// Default: 30 seconds.
    pub sweep_interval: Duration,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            idle_timeout: None,
            sweep_interval: Duration::from_secs(30),
        }
    }
}

// ---------------------------------------------------------------------------
// RoomStatus
// ---------------------------------------------------------------------------

/// The lifecycle status of a room.
///
/// ```text
/// Waiting → Running → Ended
///    └─────────┴────────┴──→ Destroyed
/// ```
///
/// - **Waiting**: accepting joins. Seats may fill and empty again.
/// - **Running**: both participants sent Start. No more joins.
/// - **Ended**: a participant finished, gave up, or disconnected mid-game.
///   The other may keep sending updates until it leaves too.
/// - **Destroyed**: removed from the directory, connections closed.
///
/// Status only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Waiting,
    Running,
    Ended,
    Destroyed,
}

impl RoomStatus {
    /// Returns `true` if the room is accepting participants.
    pub fn is_joinable(self) -> bool {
        matches!(self, Self::Waiting)
    }

    /// Returns `true` once the room has been torn down.
    pub fn is_destroyed(self) -> bool {
        matches!(self, Self::Destroyed)
    }

    /// Returns `true` if moving to `target` keeps status monotonic.
    ///
    /// Skipping ahead is allowed (a waiting room can be destroyed
    /// directly); going back is not.
    pub fn can_transition_to(self, target: Self) -> bool {
        target.rank() > self.rank()
    }

    fn rank(self) -> u8 {
        match self {
            Self::Waiting => 0,
            Self::Running => 1,
            Self::Ended => 2,
            Self::Destroyed => 3,
        }
    }
}

impl std::fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Waiting => write!(f, "waiting"),
            Self::Running => write!(f, "running"),
            Self::Ended => write!(f, "ended"),
            Self::Destroyed => write!(f, "destroyed"),
        }
    }
}
