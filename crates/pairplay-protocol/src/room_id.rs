//! Room identifiers in the xid text form.
//!
//! An xid is 12 bytes (4-byte big-endian unix timestamp, machine id,
//! process id, counter) written as 20 characters of lowercase base32hex.
//! Only the canonical spelling is accepted: a string that decodes but
//! does not encode back to itself (set padding bits, uppercase) is
//! rejected.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// Identifier of a room, e.g. `9m4e2mr0ui3e8a215n4g`.
///
/// Only obtainable through [`RoomId::parse`] or [`RoomId::generate`], so a
/// `RoomId` in hand is always well-formed.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomId(xid::Id);

impl RoomId {
    /// Validates `s` as a 20-character xid.
    ///
    /// # Errors
    /// Returns `ProtocolError::InvalidRoomId` for a wrong length, a
    /// character outside `0-9a-v`, or a non-canonical spelling.
    pub fn parse(s: &str) -> Result<Self, ProtocolError> {
        match xid::Id::from_str(s) {
            Ok(id) if id.to_string() == s => Ok(Self(id)),
            _ => Err(ProtocolError::InvalidRoomId(s.to_string())),
        }
    }

    /// Mints a fresh id.
    pub fn generate() -> Self {
        Self(xid::new())
    }

    /// The 12 raw bytes behind the text form.
    pub fn to_bytes(&self) -> [u8; 12] {
        let mut raw = [0u8; 12];
        raw.copy_from_slice(&self.0.as_bytes()[..]);
        raw
    }

    /// Creation time in unix seconds, from the first four bytes.
    pub fn timestamp(&self) -> u32 {
        let raw = self.to_bytes();
        u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]])
    }
}

impl fmt::Debug for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RoomId({})", self.0)
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for RoomId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RoomId {
    type Error = ProtocolError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<RoomId> for String {
    fn from(id: RoomId) -> Self {
        id.0.to_string()
    }
}
