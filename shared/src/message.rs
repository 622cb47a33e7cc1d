use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::player::Player;

/// How a session is played.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameMode {
    /// One human against a synthetic opponent, starts immediately
    SinglePlayer,
    /// Humans only, starts once the minimum participant count is reached
    Multiplayer,
    /// Private session that starts with its first participant
    Test,
}

/// How an arriving player wants to be placed into a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinType {
    /// Open a new session under the requested party name
    Create,
    /// Join the waiting session with the requested party name
    Particular,
    /// Join any public waiting session, or open one
    Auto,
}

/// Game-specific data the server core routes without interpreting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GamePayload {
    /// Module-defined discriminator, e.g. "move" or "board"
    pub kind: String,
    pub data: Vec<u8>,
}

impl GamePayload {
    pub fn pack<T: Serialize>(kind: &str, value: &T) -> Result<Self, bincode::Error> {
        Ok(Self {
            kind: kind.to_string(),
            data: bincode::serialize(value)?,
        })
    }

    pub fn unpack<T: DeserializeOwned>(&self) -> Result<T, bincode::Error> {
        bincode::deserialize(&self.data)
    }
}

/// Every message the server and its clients exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    // Client to server
    Identify {
        login_name: String,
        password: String,
        display_name: String,
        multi_login: bool,
    },
    Join {
        game_type: String,
        mode: GameMode,
        join_type: JoinType,
        #[serde(default)]
        party_name: Option<String>,
        #[serde(default)]
        private: bool,
    },
    GameAction {
        game_id: u64,
        payload: GamePayload,
    },
    ListGames,
    Goodbye,

    // Server to client
    IdentifyResponse {
        success: bool,
        reason: String,
        #[serde(default)]
        username: Option<String>,
    },
    JoinResponse {
        success: bool,
        created: bool,
        #[serde(default)]
        game_id: Option<u64>,
        #[serde(default)]
        party_name: Option<String>,
        #[serde(default)]
        reason: Option<String>,
    },
    GameStarted {
        game_id: u64,
        game_type: String,
        party_name: String,
        players: Vec<Player>,
    },
    GameUpdate {
        game_id: u64,
        payload: GamePayload,
    },
    GameTerminated {
        game_id: u64,
        reason: String,
    },
    GameList {
        game_types: Vec<String>,
    },
    ExceptionReport {
        message: String,
        detail: String,
    },
    ForceClose {
        reason: String,
    },

    // Both directions: the probe and its answer
    KeepAlive,
}

/// Type identity of a [`Message`], matching its `"type"` tag on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Identify,
    Join,
    GameAction,
    ListGames,
    Goodbye,
    IdentifyResponse,
    JoinResponse,
    GameStarted,
    GameUpdate,
    GameTerminated,
    GameList,
    ExceptionReport,
    ForceClose,
    KeepAlive,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Identify => "Identify",
            MessageKind::Join => "Join",
            MessageKind::GameAction => "GameAction",
            MessageKind::ListGames => "ListGames",
            MessageKind::Goodbye => "Goodbye",
            MessageKind::IdentifyResponse => "IdentifyResponse",
            MessageKind::JoinResponse => "JoinResponse",
            MessageKind::GameStarted => "GameStarted",
            MessageKind::GameUpdate => "GameUpdate",
            MessageKind::GameTerminated => "GameTerminated",
            MessageKind::GameList => "GameList",
            MessageKind::ExceptionReport => "ExceptionReport",
            MessageKind::ForceClose => "ForceClose",
            MessageKind::KeepAlive => "KeepAlive",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Identify { .. } => MessageKind::Identify,
            Message::Join { .. } => MessageKind::Join,
            Message::GameAction { .. } => MessageKind::GameAction,
            Message::ListGames => MessageKind::ListGames,
            Message::Goodbye => MessageKind::Goodbye,
            Message::IdentifyResponse { .. } => MessageKind::IdentifyResponse,
            Message::JoinResponse { .. } => MessageKind::JoinResponse,
            Message::GameStarted { .. } => MessageKind::GameStarted,
            Message::GameUpdate { .. } => MessageKind::GameUpdate,
            Message::GameTerminated { .. } => MessageKind::GameTerminated,
            Message::GameList { .. } => MessageKind::GameList,
            Message::ExceptionReport { .. } => MessageKind::ExceptionReport,
            Message::ForceClose { .. } => MessageKind::ForceClose,
            Message::KeepAlive => MessageKind::KeepAlive,
        }
    }

    pub fn force_close(reason: impl Into<String>) -> Self {
        Message::ForceClose {
            reason: reason.into(),
        }
    }

    pub fn exception(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Message::ExceptionReport {
            message: message.into(),
            detail: detail.into(),
        }
    }

    pub fn join_failed(reason: impl Into<String>) -> Self {
        Message::JoinResponse {
            success: false,
            created: false,
            game_id: None,
            party_name: None,
            reason: Some(reason.into()),
        }
    }
}

/// Root wire type: a message plus the player it concerns, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player: Option<Player>,
    pub message: Message,
}

impl Envelope {
    pub fn new(message: Message) -> Self {
        Self {
            player: None,
            message,
        }
    }

    pub fn for_player(player: Player, message: Message) -> Self {
        Self {
            player: Some(player),
            message,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.message.kind().as_str()
    }
}
