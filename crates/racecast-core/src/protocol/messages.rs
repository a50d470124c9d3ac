//! All Racecast protocol message types.
//!
//! Every message travels as one JSON object whose `"type"` field names the
//! variant; all other fields sit next to it in snake_case:
//!
//! ```json
//! {"type":"login","id":"4f1c…"}
//! {"type":"position","location":{"lat":37.41,"lng":-122.07}}
//! {"type":"game_state","players":2,"state":"load","race":{…}}
//! ```
//!
//! Encoding and decoding live in [`crate::protocol::codec`]; this module only
//! defines the shapes.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::protocol::codec::CodecError;

// ── Message type discriminants ────────────────────────────────────────────────

/// All `"type"` discriminants defined by the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Login,
    Logout,
    Position,
    Request,
    GameState,
    PlayerState,
    GameScores,
}

impl MessageType {
    /// The wire string carried in the `"type"` field.
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::Login => "login",
            MessageType::Logout => "logout",
            MessageType::Position => "position",
            MessageType::Request => "request",
            MessageType::GameState => "game_state",
            MessageType::PlayerState => "player_state",
            MessageType::GameScores => "game_scores",
        }
    }
}

impl TryFrom<&str> for MessageType {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, ()> {
        match value {
            "login" => Ok(MessageType::Login),
            "logout" => Ok(MessageType::Logout),
            "position" => Ok(MessageType::Position),
            "request" => Ok(MessageType::Request),
            "game_state" => Ok(MessageType::GameState),
            "player_state" => Ok(MessageType::PlayerState),
            "game_scores" => Ok(MessageType::GameScores),
            _ => Err(()),
        }
    }
}

// ── Shared payload types ──────────────────────────────────────────────────────

/// A geographic coordinate in degrees.
///
/// Always encoded as `{"lat": <f64>, "lng": <f64>}`, however deeply it is
/// nested inside a message.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
}

impl Location {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Phase of the race as broadcast by the receiver.
///
/// Unknown strings decode to [`GamePhase::Init`] with a warning so a newer
/// receiver cannot break an older sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum GamePhase {
    #[default]
    Init,
    Load,
    Race,
    Scores,
}

impl GamePhase {
    pub fn as_str(self) -> &'static str {
        match self {
            GamePhase::Init => "init",
            GamePhase::Load => "load",
            GamePhase::Race => "race",
            GamePhase::Scores => "scores",
        }
    }
}

impl From<String> for GamePhase {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "init" => GamePhase::Init,
            "load" => GamePhase::Load,
            "race" => GamePhase::Race,
            "scores" => GamePhase::Scores,
            other => {
                warn!("received invalid game phase {other:?}; treating as init");
                GamePhase::Init
            }
        }
    }
}

impl From<GamePhase> for String {
    fn from(value: GamePhase) -> Self {
        value.as_str().to_string()
    }
}

/// Per-player phase reported by the receiver.
///
/// Unknown strings decode to [`PlayerPhase::Waiting`] with a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PlayerPhase {
    Active,
    #[default]
    Waiting,
    Finished,
}

impl PlayerPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            PlayerPhase::Active => "active",
            PlayerPhase::Waiting => "waiting",
            PlayerPhase::Finished => "finished",
        }
    }
}

impl From<String> for PlayerPhase {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "active" => PlayerPhase::Active,
            "waiting" => PlayerPhase::Waiting,
            "finished" => PlayerPhase::Finished,
            other => {
                warn!("received invalid player phase {other:?}; treating as waiting");
                PlayerPhase::Waiting
            }
        }
    }
}

impl From<PlayerPhase> for String {
    fn from(value: PlayerPhase) -> Self {
        value.as_str().to_string()
    }
}

/// The race currently set up on the receiver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Race {
    pub start_location: Location,
    /// Milliseconds since the Unix epoch at which the countdown ends.
    pub start_time: i64,
    pub target_location: Location,
    pub target_title: String,
}

/// One leaderboard row inside [`GameScoresMessage`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreEntry {
    /// Install id of the player.
    pub id: String,
    pub name: String,
    pub score: f64,
    /// Race duration in milliseconds.
    pub time: i64,
}

// ── Per-message payload structs ───────────────────────────────────────────────

/// `login`: sent by the sender once the receiver application is running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginMessage {
    /// Stable per-installation identity token.
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl LoginMessage {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// `logout`: the player is leaving and will not come back soon.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogoutMessage {}

/// `position`: the player's current street-view position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionMessage {
    pub location: Location,
}

impl PositionMessage {
    pub fn new(location: Location) -> Self {
        Self { location }
    }
}

/// `request`: asks the receiver to set up a new race.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestMessage {
    pub target_title: String,
    pub target_location: Location,
    pub start_location: Location,
    /// Rough player location, used by the receiver to pick a nearby race.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coarse_user_location: Option<Location>,
}

impl RequestMessage {
    pub fn builder() -> RequestBuilder {
        RequestBuilder::default()
    }
}

/// Field-by-field builder for [`RequestMessage`].
#[derive(Debug, Default)]
pub struct RequestBuilder {
    target: Option<(String, Location)>,
    start: Option<Location>,
    user_location: Option<Location>,
}

impl RequestBuilder {
    pub fn target(mut self, title: impl Into<String>, location: Location) -> Self {
        self.target = Some((title.into(), location));
        self
    }

    pub fn start(mut self, location: Location) -> Self {
        self.start = Some(location);
        self
    }

    pub fn user_location(mut self, location: Location) -> Self {
        self.user_location = Some(location);
        self
    }

    /// # Errors
    ///
    /// Returns [`CodecError::MissingField`] if the target or start was never set.
    pub fn build(self) -> Result<RequestMessage, CodecError> {
        let (target_title, target_location) =
            self.target.ok_or(CodecError::MissingField("target_location"))?;
        let start_location = self.start.ok_or(CodecError::MissingField("start_location"))?;
        Ok(RequestMessage {
            target_title,
            target_location,
            start_location,
            coarse_user_location: self.user_location,
        })
    }
}

/// `game_state`: receiver-wide state broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameStateMessage {
    pub players: u32,
    pub state: GamePhase,
    /// Absent while the receiver is still in [`GamePhase::Init`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub race: Option<Race>,
}

/// `player_state`: this player's own phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerStateMessage {
    pub state: PlayerPhase,
}

/// `game_scores`: leaderboard after a race.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameScoresMessage {
    #[serde(default)]
    pub scores: Vec<ScoreEntry>,
}

// ── Top-level message enum ────────────────────────────────────────────────────

/// All Racecast messages, discriminated by the `"type"` field.
///
/// [`Message::Unknown`] is never produced by serde directly; the codec builds
/// it for discriminants this version does not understand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    Login(LoginMessage),
    Logout(LogoutMessage),
    Position(PositionMessage),
    Request(RequestMessage),
    GameState(GameStateMessage),
    PlayerState(PlayerStateMessage),
    GameScores(GameScoresMessage),
    /// Inert message carrying an unrecognised discriminant.
    #[serde(skip)]
    Unknown(String),
}

impl Message {
    /// Returns the [`MessageType`], or `None` for [`Message::Unknown`].
    pub fn message_type(&self) -> Option<MessageType> {
        match self {
            Message::Login(_) => Some(MessageType::Login),
            Message::Logout(_) => Some(MessageType::Logout),
            Message::Position(_) => Some(MessageType::Position),
            Message::Request(_) => Some(MessageType::Request),
            Message::GameState(_) => Some(MessageType::GameState),
            Message::PlayerState(_) => Some(MessageType::PlayerState),
            Message::GameScores(_) => Some(MessageType::GameScores),
            Message::Unknown(_) => None,
        }
    }

    /// The `"type"` string this message carries on the wire.
    pub fn type_name(&self) -> &str {
        match self {
            Message::Unknown(name) => name,
            other => other
                .message_type()
                .map(MessageType::as_str)
                .unwrap_or_default(),
        }
    }
}

impl From<LoginMessage> for Message {
    fn from(m: LoginMessage) -> Self {
        Message::Login(m)
    }
}

impl From<LogoutMessage> for Message {
    fn from(m: LogoutMessage) -> Self {
        Message::Logout(m)
    }
}

impl From<PositionMessage> for Message {
    fn from(m: PositionMessage) -> Self {
        Message::Position(m)
    }
}

impl From<RequestMessage> for Message {
    fn from(m: RequestMessage) -> Self {
        Message::Request(m)
    }
}
