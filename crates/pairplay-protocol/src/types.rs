//! Message types for pairplay's wire format.
//!
//! Everything here is JSON with small integer codes, matching what the
//! browser tetris client sends and expects:
//!
//! ```text
//! client → room   {"token":"…","code":1,"data":{"score":40,…}}
//! room   → client {"code":2,"other":{"score":40,…}}
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// PlayerToken
// ---------------------------------------------------------------------------

/// Opaque reconnection token, usually from the `token` cookie.
///
/// Two connections presenting the same token are the same participant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerToken(String);

impl PlayerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Only the first 8 characters are shown so logs don't leak whole tokens.
impl fmt::Display for PlayerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown = match self.0.char_indices().nth(8) {
            Some((end, _)) => &self.0[..end],
            None => &self.0[..],
        };
        if shown.len() < self.0.len() {
            write!(f, "{shown}…")
        } else {
            f.write_str(shown)
        }
    }
}

// ---------------------------------------------------------------------------
// Command: client → room codes
// ---------------------------------------------------------------------------

/// What a [`ClientMessage`] asks the room to do.
///
/// Codes the room doesn't act on survive decoding as [`Command::Other`] so
/// they can be logged and ignored instead of failing the whole message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
#[serde(from = "u8", into = "u8")]
pub enum Command {
    /// `0`: announce presence. Joining happens at connect time, so the
    /// room ignores it.
    #[default]
    Join,
    /// `1`: replace the sender's game data and relay it to the opponent.
    Update,
    /// `2`: leave the room.
    Leave,
    /// `3`: mark the sender ready.
    Start,
    /// `4`: pause request.
    Pause,
    /// Any other code.
    Other(u8),
}

impl From<u8> for Command {
    fn from(code: u8) -> Self {
        match code {
            0 => Self::Join,
            1 => Self::Update,
            2 => Self::Leave,
            3 => Self::Start,
            4 => Self::Pause,
            other => Self::Other(other),
        }
    }
}

impl From<Command> for u8 {
    fn from(cmd: Command) -> Self {
        match cmd {
            Command::Join => 0,
            Command::Update => 1,
            Command::Leave => 2,
            Command::Start => 3,
            Command::Pause => 4,
            Command::Other(code) => code,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Join => f.write_str("join"),
            Self::Update => f.write_str("update"),
            Self::Leave => f.write_str("leave"),
            Self::Start => f.write_str("start"),
            Self::Pause => f.write_str("pause"),
            Self::Other(code) => write!(f, "code {code}"),
        }
    }
}

// ---------------------------------------------------------------------------
// GameStatus
// ---------------------------------------------------------------------------

/// A participant's own view of their game, carried inside [`GameData`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub enum GameStatus {
    #[default]
    Waiting,
    Pause,
    Start,
    Run,
    End,
    GiveUp,
}

impl GameStatus {
    /// `true` once the game can no longer continue.
    pub fn is_over(self) -> bool {
        matches!(self, Self::End | Self::GiveUp)
    }
}

impl TryFrom<u8> for GameStatus {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Waiting),
            1 => Ok(Self::Pause),
            2 => Ok(Self::Start),
            3 => Ok(Self::Run),
            4 => Ok(Self::End),
            5 => Ok(Self::GiveUp),
            other => Err(format!("unknown game status {other}")),
        }
    }
}

impl From<GameStatus> for u8 {
    fn from(status: GameStatus) -> Self {
        match status {
            GameStatus::Waiting => 0,
            GameStatus::Pause => 1,
            GameStatus::Start => 2,
            GameStatus::Run => 3,
            GameStatus::End => 4,
            GameStatus::GiveUp => 5,
        }
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Waiting => "waiting",
            Self::Pause => "pause",
            Self::Start => "start",
            Self::Run => "run",
            Self::End => "end",
            Self::GiveUp => "giveup",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// GameData
// ---------------------------------------------------------------------------

/// The falling piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TetrisSprite {
    /// Piece shape.
    #[serde(rename = "type")]
    pub kind: i32,
    /// Rotation state.
    pub state: i32,
    /// Column and row of the piece origin.
    pub pos: [i32; 2],
}

/// A snapshot of one participant's board.
///
/// The room never looks inside beyond `status`; it stores the latest
/// snapshot wholesale and forwards it to the opponent. Missing fields take
/// their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GameData {
    pub score: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sprite: Option<TetrisSprite>,
    pub grid: Vec<i32>,
    pub status: GameStatus,
}

// ---------------------------------------------------------------------------
// ClientMessage
// ---------------------------------------------------------------------------

/// A frame sent by a participant to its room.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClientMessage {
    /// Echo of the participant's token. Informational; the room identifies
    /// senders by their connection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default)]
    pub code: Command,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<GameData>,
}

// ---------------------------------------------------------------------------
// ServerMessage: room → client
// ---------------------------------------------------------------------------

/// Kind of a [`ServerMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ServerCode {
    /// `0`: both participants are ready; the game is running.
    Started,
    /// `1`: the game is paused.
    Paused,
    /// `2`: the opponent's board changed.
    Updated,
}

impl TryFrom<u8> for ServerCode {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Started),
            1 => Ok(Self::Paused),
            2 => Ok(Self::Updated),
            other => Err(format!("unknown server code {other}")),
        }
    }
}

impl From<ServerCode> for u8 {
    fn from(code: ServerCode) -> Self {
        match code {
            ServerCode::Started => 0,
            ServerCode::Paused => 1,
            ServerCode::Updated => 2,
        }
    }
}

/// A frame sent by a room to one participant.
///
/// `self` and `other` are omitted when absent, never sent as `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerMessage {
    pub code: ServerCode,
    /// The recipient's own data.
    #[serde(
        rename = "self",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub self_data: Option<GameData>,
    /// The opponent's data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other: Option<GameData>,
}

impl ServerMessage {
    pub fn started() -> Self {
        Self {
            code: ServerCode::Started,
            self_data: None,
            other: None,
        }
    }

    pub fn paused() -> Self {
        Self {
            code: ServerCode::Paused,
            self_data: None,
            other: None,
        }
    }

    /// The opponent's latest board.
    pub fn updated(other: GameData) -> Self {
        Self {
            code: ServerCode::Updated,
            self_data: None,
            other: Some(other),
        }
    }
}

// ---------------------------------------------------------------------------
// CloseReason
// ---------------------------------------------------------------------------

/// Application close code and reason sent when a connection is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseReason {
    pub code: u16,
    pub reason: &'static str,
}

impl CloseReason {
    /// The request path does not name a valid room.
    pub const INVALID_PATH: Self = Self {
        code: 4000,
        reason: "invalid Path",
    };

    /// The room exists but refused the join (full, running, or destroyed).
    pub const ROOM_UNAVAILABLE: Self = Self {
        code: 4001,
        reason: "room unavailable",
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    // =====================================================================
    // Client messages
    // =====================================================================

    #[test]
    fn test_client_message_decodes_update() {
        let json = r#"{
            "token": "abc",
            "code": 1,
            "data": {
                "score": 40,
                "sprite": {"type": 3, "state": 1, "pos": [4, 0]},
                "grid": [0, 1, 1],
                "status": 3
            }
        }"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();

        assert_eq!(msg.token.as_deref(), Some("abc"));
        assert_eq!(msg.code, Command::Update);
        let data = msg.data.unwrap();
        assert_eq!(data.score, 40);
        assert_eq!(
            data.sprite,
            Some(TetrisSprite {
                kind: 3,
                state: 1,
                pos: [4, 0]
            })
        );
        assert_eq!(data.grid, vec![0, 1, 1]);
        assert_eq!(data.status, GameStatus::Run);
    }

    #[test]
    fn test_client_message_missing_fields_default() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"code":1,"data":{"score":40}}"#).unwrap();
        let data = msg.data.unwrap();
        assert_eq!(data.score, 40);
        assert_eq!(data.sprite, None);
        assert!(data.grid.is_empty());
        assert_eq!(data.status, GameStatus::Waiting);

        let bare: ClientMessage = serde_json::from_str("{}").unwrap();
        assert_eq!(bare.code, Command::Join);
        assert_eq!(bare.data, None);
    }

    #[test]
    fn test_command_codes() {
        for (code, cmd) in [
            (0, Command::Join),
            (1, Command::Update),
            (2, Command::Leave),
            (3, Command::Start),
            (4, Command::Pause),
        ] {
            assert_eq!(Command::from(code), cmd);
            assert_eq!(u8::from(cmd), code);
        }
        let msg: ClientMessage = serde_json::from_str(r#"{"code":9}"#).unwrap();
        assert_eq!(msg.code, Command::Other(9));
    }

    #[test]
    fn test_unknown_game_status_fails_decode() {
        let result: Result<GameData, _> =
            serde_json::from_str(r#"{"status":6}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_game_status_is_over() {
        assert!(GameStatus::End.is_over());
        assert!(GameStatus::GiveUp.is_over());
        assert!(!GameStatus::Run.is_over());
    }

    // =====================================================================
    // Server messages
    // =====================================================================

    #[test]
    fn test_server_message_omits_absent_fields() {
        let json = serde_json::to_string(&ServerMessage::started()).unwrap();
        assert_eq!(json, r#"{"code":0}"#);

        let json = serde_json::to_string(&ServerMessage::paused()).unwrap();
        assert_eq!(json, r#"{"code":1}"#);
    }

    #[test]
    fn test_server_message_updated_shape() {
        let msg = ServerMessage::updated(GameData {
            score: 40,
            grid: vec![1],
            status: GameStatus::Run,
            ..GameData::default()
        });
        let value: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "code": 2,
                "other": {"score": 40, "grid": [1], "status": 3}
            })
        );
    }

    #[test]
    fn test_server_message_self_field_name() {
        let msg = ServerMessage {
            code: ServerCode::Updated,
            self_data: Some(GameData::default()),
            other: None,
        };
        let value: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert!(value.get("self").is_some());
        assert!(value.get("other").is_none());
    }

    // =====================================================================
    // Identifiers
    // =====================================================================

    #[test]
    fn test_player_token_display_is_shortened() {
        let token = PlayerToken::new("0123456789abcdef");
        assert_eq!(token.to_string(), "01234567…");
        assert_eq!(PlayerToken::new("abc").to_string(), "abc");
    }

    #[test]
    fn test_player_token_serializes_as_plain_string() {
        let json = serde_json::to_string(&PlayerToken::new("abc")).unwrap();
        assert_eq!(json, r#""abc""#);
    }

    #[test]
    fn test_close_reasons() {
        assert_eq!(CloseReason::INVALID_PATH.code, 4000);
        assert_eq!(CloseReason::INVALID_PATH.reason, "invalid Path");
        assert_eq!(CloseReason::ROOM_UNAVAILABLE.code, 4001);
    }
}
