//! Authoritative simulation: world catalog, player physics, round rules.

pub mod geometry;
pub mod physics;
pub mod room;
pub mod round;
pub mod snapshot;
pub mod world;

use serde::{Deserialize, Serialize};

use self::geometry::Aabb;
use self::world::{WorldId, WorldRuntime, PLAYER_HEIGHT, PLAYER_WIDTH};

/// Held-key intent for one player. Last write wins; frames are sampled each
/// tick, not queued.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputFrame {
    #[serde(default)]
    pub left: bool,
    #[serde(default)]
    pub right: bool,
    #[serde(default)]
    pub jump: bool,
}

/// Round status as broadcast to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    Waiting,
    Playing,
    Dead,
    Won,
}

/// Display color for a slot. Slots are 1-based and at most four.
pub fn slot_color(slot: u8) -> &'static str {
    match slot {
        1 => "#e74c3c",
        2 => "#3498db",
        3 => "#2ecc71",
        _ => "#f1c40f",
    }
}

/// Per-tick simulation entity for one player.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    /// Slot number, 1..4. Fixed at creation.
    pub id: u8,
    pub client_player_id: String,
    pub hero: Option<String>,
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    pub width: f64,
    pub height: f64,
    pub on_ground: bool,
    pub facing_right: bool,
    pub anim_frame: u8,
    pub color: &'static str,
    pub dead: bool,
    pub standing_on_player: Option<u8>,
    #[serde(skip)]
    pub prev_y: f64,
}

impl PlayerState {
    pub fn new(
        slot: u8,
        client_player_id: String,
        hero: Option<String>,
        name: String,
        spawn_x: f64,
        spawn_y: f64,
    ) -> Self {
        Self {
            id: slot,
            client_player_id,
            hero,
            name,
            x: spawn_x,
            y: spawn_y,
            vx: 0.0,
            vy: 0.0,
            width: PLAYER_WIDTH,
            height: PLAYER_HEIGHT,
            on_ground: true,
            facing_right: true,
            anim_frame: 0,
            color: slot_color(slot),
            dead: false,
            standing_on_player: None,
            prev_y: spawn_y,
        }
    }

    pub fn rect(&self) -> Aabb {
        Aabb::new(self.x, self.y, self.width, self.height)
    }

    fn reseat(&mut self, spawn_x: f64, spawn_y: f64) {
        self.x = spawn_x;
        self.y = spawn_y;
        self.vx = 0.0;
        self.vy = 0.0;
        self.on_ground = true;
        self.anim_frame = 0;
        self.dead = false;
        self.standing_on_player = None;
        self.prev_y = spawn_y;
    }
}

/// Spawn x for a slot: slots fan out rightward from the first ledge.
pub fn spawn_x(slot: u8) -> f64 {
    100.0 + f64::from(slot.saturating_sub(1)) * 60.0
}

/// One room's simulation state: the world runtime plus every player entity
/// and the round latches. Owned exclusively by the room task.
#[derive(Debug)]
pub struct Simulation {
    pub world: WorldRuntime,
    /// World 2 ground base; carried so round resets rebuild at the same base.
    pub base_y: f64,
    pub players: Vec<PlayerState>,
    pub key_collected: bool,
    pub players_at_door: Vec<u8>,
    pub status: GameStatus,
    /// Absolute wallclock ms at which a dead round respawns. Zero when not dead.
    pub dead_until: u64,
}

impl Simulation {
    pub fn new(id: WorldId, base_y: f64, status: GameStatus) -> Self {
        Self {
            world: world::runtime(id, base_y),
            base_y,
            players: Vec::new(),
            key_collected: false,
            players_at_door: Vec::new(),
            status,
            dead_until: 0,
        }
    }

    /// Create the player's simulation entity if missing, and repair any
    /// non-finite coordinates by reseating at spawn.
    pub fn ensure_player(
        &mut self,
        slot: u8,
        client_player_id: &str,
        hero: Option<String>,
        name: &str,
    ) {
        let sx = spawn_x(slot);
        let sy = self.world.spawn_y();
        match self
            .players
            .iter_mut()
            .find(|p| p.client_player_id == client_player_id)
        {
            Some(p) => {
                if !(p.x.is_finite() && p.y.is_finite() && p.vx.is_finite() && p.vy.is_finite()) {
                    p.reseat(sx, sy);
                }
            }
            None => {
                self.players.push(PlayerState::new(
                    slot,
                    client_player_id.to_string(),
                    hero,
                    name.to_string(),
                    sx,
                    sy,
                ));
            }
        }
    }

    pub fn remove_player(&mut self, client_player_id: &str) {
        self.players
            .retain(|p| p.client_player_id != client_player_id);
    }

    pub fn player_index(&self, client_player_id: &str) -> Option<usize> {
        self.players
            .iter()
            .position(|p| p.client_player_id == client_player_id)
    }

    /// Rebuild the world from its blueprint and put every player back at
    /// spawn. Used at round start and after a death respawn.
    pub fn reset_round(&mut self) {
        self.world = world::runtime(self.world.id, self.base_y);
        self.key_collected = false;
        self.players_at_door.clear();
        self.status = GameStatus::Playing;
        self.dead_until = 0;
        let sy = self.world.spawn_y();
        for p in &mut self.players {
            let sx = spawn_x(p.id);
            p.reseat(sx, sy);
        }
    }

    /// Rebuild world 2 at a new ground base, keeping players planted by
    /// translating them with the ground.
    pub fn rebase(&mut self, new_base_y: f64) {
        let old_ground = self.world.ground_y;
        self.base_y = new_base_y;
        self.world = world::runtime(self.world.id, new_base_y);
        let delta = self.world.ground_y - old_ground;
        for p in &mut self.players {
            if !p.dead {
                p.y += delta;
                p.prev_y += delta;
            }
        }
    }
}
