//! WebSocket protocol message definitions.
//! These are the wire types for client-server communication.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::game::geometry::Aabb;
use crate::game::room::LobbyPlayer;
use crate::game::world::{FallingPlatform, MovingPlatform};
use crate::game::{GameStatus, InputFrame, PlayerState};

/// Messages sent from client to server.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMsg {
    /// Create a room and become its host.
    CreateRoom {
        room_code: String,
        #[serde(default)]
        max_players: i64,
        host_id: String,
        #[serde(default)]
        player_name: Option<String>,
        #[serde(default)]
        world: Option<Value>,
        #[serde(default)]
        level: Option<Value>,
        #[serde(default)]
        canvas_height: Option<f64>,
    },

    /// Join an existing room, or reconnect to a slot held under grace.
    JoinRoom {
        room_code: String,
        player_id: String,
        #[serde(default)]
        name: Option<String>,
    },

    SetPlayerName {
        name: String,
    },

    /// Host-only world selection. `setLevel` is the older client spelling.
    SetWorld {
        world: Value,
    },
    SetLevel {
        #[serde(default)]
        level: Option<Value>,
        #[serde(default)]
        world: Option<Value>,
    },

    SelectHero {
        hero: String,
    },

    SetReady {
        #[serde(default)]
        ready: bool,
    },

    StartGameNow,

    /// Held-key intent, repeated by the client every frame.
    #[serde(alias = "playerMove")]
    PlayerInput(InputPayload),
}

impl ClientMsg {
    /// The world value of a setWorld/setLevel command, whichever field the
    /// client used.
    pub fn level_value(level: &Option<Value>, world: &Option<Value>) -> Value {
        world
            .clone()
            .or_else(|| level.clone())
            .unwrap_or(Value::Null)
    }
}

/// Tolerant playerInput payload. Clients send `{input:{..}}`, `{keys:{..}}`,
/// or the three booleans flat; all parse to the same frame. The optional
/// viewport height drives the world 2 ground base.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputPayload {
    #[serde(default)]
    pub input: Option<InputFrame>,
    #[serde(default)]
    pub keys: Option<InputFrame>,
    #[serde(default)]
    pub left: bool,
    #[serde(default)]
    pub right: bool,
    #[serde(default)]
    pub jump: bool,
    #[serde(default)]
    pub canvas_height: Option<f64>,
    #[serde(default)]
    pub viewport_height: Option<f64>,
    #[serde(default)]
    pub height: Option<f64>,
}

impl InputPayload {
    pub fn frame(&self) -> InputFrame {
        self.input.or(self.keys).unwrap_or(InputFrame {
            left: self.left,
            right: self.right,
            jump: self.jump,
        })
    }

    pub fn viewport(&self) -> Option<f64> {
        self.canvas_height.or(self.viewport_height).or(self.height)
    }
}

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMsg {
    /// Confirmation of room creation or join.
    JoinSuccess {
        room_code: String,
        player_id: String,
        /// Slot number, 1-based.
        player_index: u8,
        message: String,
    },

    CreateDenied {
        message: String,
    },
    JoinDenied {
        message: String,
    },
    HeroDenied {
        message: String,
    },
    ReadyDenied {
        message: String,
    },
    StartDenied {
        message: String,
    },

    /// The match begins; the next gameState carries status "playing".
    StartGame,

    /// Lobby view, emitted after any lobby-visible change.
    RoomState(RoomStatePayload),

    /// Simulation snapshot, emitted every tick.
    GameState(GameStatePayload),
}

/// Lobby metadata for a room.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomStatePayload {
    pub room_code: String,
    pub max_players: u8,
    pub host_id: String,
    pub started: bool,
    pub world: u8,
    pub players: BTreeMap<String, LobbyPlayer>,
}

/// Full simulation snapshot for a room.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStatePayload {
    pub players: BTreeMap<String, PlayerState>,
    pub key_collected: bool,
    pub players_at_door: Vec<u8>,
    pub game_status: GameStatus,
    pub world: u8,
    pub key: Aabb,
    pub door: Aabb,
    pub danger_buttons: Vec<Aabb>,
    pub moving_platforms: Vec<MovingPlatform>,
    pub falling_platforms: Vec<FallingPlatform>,
}
