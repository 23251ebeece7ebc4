//! Room lifecycle and the per-room task.
//!
//! Every room is owned by exactly one tokio task that multiplexes the tick
//! timer and an inbound command channel, so all mutation of room state is
//! serialized. The registry only hands out command senders.

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, InputPayload, ServerMsg};

use super::world::{self, WorldId};
use super::{physics, round, snapshot, GameStatus, InputFrame, Simulation};

/// Hard cap on room size, matching the four slot colors.
pub const MAX_PLAYERS_CAP: i64 = 4;

/// Lobby-side view of a player.
#[derive(Debug, Clone, Serialize)]
pub struct LobbyPlayer {
    pub hero: Option<String>,
    pub ready: bool,
    pub name: String,
    /// Assigned once at join (lowest free 1..4) and held until the grace
    /// timer removes the player. Departures never renumber the others.
    pub slot: u8,
}

/// Trim and bound a display name. Returns None when nothing usable remains.
pub fn sanitize_name(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(20).collect())
}

/// Commands delivered to a room task. Sessions forward parsed client
/// messages; grace timers post their own expiry back onto the channel.
pub enum RoomCommand {
    Join {
        player_id: String,
        name: Option<String>,
        conn_id: Uuid,
        tx: mpsc::Sender<ServerMsg>,
        reply: oneshot::Sender<Result<(), String>>,
    },
    Client {
        conn_id: Uuid,
        player_id: String,
        msg: ClientMsg,
    },
    Disconnect {
        conn_id: Uuid,
        player_id: String,
    },
    GraceExpired {
        player_id: String,
        epoch: u64,
    },
}

/// Handle to a live room.
#[derive(Clone, Debug)]
pub struct RoomHandle {
    pub code: String,
    pub cmd_tx: mpsc::Sender<RoomCommand>,
    player_count: Arc<AtomicUsize>,
}

impl RoomHandle {
    pub fn player_count(&self) -> usize {
        self.player_count.load(Ordering::Relaxed)
    }
}

/// Parameters for room creation, extracted from the createRoom message.
pub struct CreateRoomParams {
    pub room_code: String,
    pub max_players: i64,
    pub host_id: String,
    pub player_name: Option<String>,
    pub world: WorldId,
    pub canvas_height: Option<f64>,
}

/// Registry of all live rooms, shared behind the app state.
pub struct RoomRegistry {
    rooms: DashMap<String, RoomHandle>,
    config: Arc<Config>,
}

impl RoomRegistry {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            rooms: DashMap::new(),
            config,
        }
    }

    pub fn get(&self, code: &str) -> Option<RoomHandle> {
        self.rooms.get(code).map(|r| r.value().clone())
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn total_players(&self) -> usize {
        self.rooms.iter().map(|r| r.value().player_count()).sum()
    }

    /// Validate and create a room with the caller as host, then spawn its
    /// task. The handle is registered before the task starts so lookups
    /// succeed as soon as this returns.
    pub fn create_room(
        self: &Arc<Self>,
        params: CreateRoomParams,
        conn_id: Uuid,
        tx: mpsc::Sender<ServerMsg>,
    ) -> Result<RoomHandle, String> {
        if !(1..=MAX_PLAYERS_CAP).contains(&params.max_players) {
            return Err("maxPlayers must be between 1 and 4".to_string());
        }
        let code = params.room_code.trim().to_ascii_uppercase();
        if code.is_empty() {
            return Err("Room code required".to_string());
        }

        use dashmap::mapref::entry::Entry;
        match self.rooms.entry(code.clone()) {
            Entry::Occupied(_) => Err("Room already exists".to_string()),
            Entry::Vacant(slot) => {
                let (room, cmd_rx, handle) = Room::new(
                    code.clone(),
                    params.max_players as u8,
                    params.host_id,
                    params.player_name,
                    params.world,
                    params.canvas_height,
                    self.config.clone(),
                    conn_id,
                    tx,
                );
                slot.insert(handle.clone());

                let registry = self.clone();
                tokio::spawn(async move {
                    room.run(cmd_rx).await;
                    registry.rooms.remove(&code);
                });

                Ok(handle)
            }
        }
    }
}

struct Conn {
    player_id: String,
    tx: mpsc::Sender<ServerMsg>,
}

/// All state for one room. Owned by the room task; never shared.
pub struct Room {
    code: String,
    config: Arc<Config>,
    max_players: u8,
    host_id: String,
    started: bool,
    world: WorldId,
    world2_base_y: f64,
    player_order: Vec<String>,
    players: HashMap<String, LobbyPlayer>,
    sim: Simulation,
    inputs: HashMap<String, InputFrame>,
    last_step_at: Option<u64>,
    conns: HashMap<Uuid, Conn>,
    grace_epochs: HashMap<String, u64>,
    cmd_tx: mpsc::Sender<RoomCommand>,
    player_count: Arc<AtomicUsize>,
}

impl Room {
    #[allow(clippy::too_many_arguments)]
    fn new(
        code: String,
        max_players: u8,
        host_id: String,
        host_name: Option<String>,
        world_id: WorldId,
        canvas_height: Option<f64>,
        config: Arc<Config>,
        conn_id: Uuid,
        tx: mpsc::Sender<ServerMsg>,
    ) -> (Self, mpsc::Receiver<RoomCommand>, RoomHandle) {
        let (cmd_tx, cmd_rx) = mpsc::channel(256);
        let player_count = Arc::new(AtomicUsize::new(1));

        let base_y = canvas_height
            .map(world::base_y_for_viewport)
            .unwrap_or(config.world2_base_y);

        let name = host_name
            .as_deref()
            .and_then(sanitize_name)
            .unwrap_or_else(|| "Player 1".to_string());

        let mut players = HashMap::new();
        players.insert(
            host_id.clone(),
            LobbyPlayer {
                hero: None,
                ready: false,
                name,
                slot: 1,
            },
        );

        let mut conns = HashMap::new();
        conns.insert(
            conn_id,
            Conn {
                player_id: host_id.clone(),
                tx,
            },
        );

        let handle = RoomHandle {
            code: code.clone(),
            cmd_tx: cmd_tx.clone(),
            player_count: player_count.clone(),
        };

        let room = Self {
            code,
            config,
            max_players,
            host_id: host_id.clone(),
            started: false,
            world: world_id,
            world2_base_y: base_y,
            player_order: vec![host_id],
            players,
            sim: Simulation::new(world_id, base_y, GameStatus::Waiting),
            inputs: HashMap::new(),
            last_step_at: None,
            conns,
            grace_epochs: HashMap::new(),
            cmd_tx,
            player_count,
        };

        (room, cmd_rx, handle)
    }

    /// Drive the room until it empties out. Commands are always processed
    /// between ticks; a tick is never interrupted.
    pub async fn run(mut self, mut cmd_rx: mpsc::Receiver<RoomCommand>) {
        info!(room = %self.code, host = %self.host_id, "room created");

        // Announce the freshly created room to its host.
        if let Some(conn_id) = self.conns.keys().next().copied() {
            let host_id = self.host_id.clone();
            self.send_join_success(conn_id, &host_id);
        }
        self.emit_room_state();
        self.emit_game_state();

        let mut ticker = interval(Duration::from_millis(self.config.tick_interval_ms()));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.started {
                        self.step();
                    }
                }
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => {
                            if self.handle(cmd).is_break() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }

        info!(room = %self.code, "room closed");
    }

    fn handle(&mut self, cmd: RoomCommand) -> ControlFlow<()> {
        match cmd {
            RoomCommand::Join {
                player_id,
                name,
                conn_id,
                tx,
                reply,
            } => {
                let result = self.join(&player_id, name, conn_id, tx);
                let _ = reply.send(result.clone());
                if result.is_ok() {
                    self.send_join_success(conn_id, &player_id);
                    self.emit_room_state();
                    self.emit_game_state();
                }
                ControlFlow::Continue(())
            }
            RoomCommand::Client {
                conn_id,
                player_id,
                msg,
            } => self.handle_client(conn_id, &player_id, msg),
            RoomCommand::Disconnect { conn_id, player_id } => {
                self.conns.remove(&conn_id);
                if !self.has_live_connection(&player_id) && self.players.contains_key(&player_id) {
                    self.arm_grace(&player_id);
                }
                ControlFlow::Continue(())
            }
            RoomCommand::GraceExpired { player_id, epoch } => {
                let current = self.grace_epochs.get(&player_id).copied();
                if current == Some(epoch) && !self.has_live_connection(&player_id) {
                    return self.remove_player(&player_id);
                }
                ControlFlow::Continue(())
            }
        }
    }

    fn join(
        &mut self,
        player_id: &str,
        name: Option<String>,
        conn_id: Uuid,
        tx: mpsc::Sender<ServerMsg>,
    ) -> Result<(), String> {
        if !self.players.contains_key(player_id) {
            if self.started {
                return Err("Game already started".to_string());
            }
            if self.players.len() >= self.max_players as usize {
                return Err("Room is full".to_string());
            }
            let slot = self.next_free_slot();
            let default_name = format!("Player {slot}");
            let name = name
                .as_deref()
                .and_then(sanitize_name)
                .unwrap_or(default_name);
            self.players.insert(
                player_id.to_string(),
                LobbyPlayer {
                    hero: None,
                    ready: false,
                    name,
                    slot,
                },
            );
            self.player_order.push(player_id.to_string());
            info!(room = %self.code, player = %player_id, "player joined");
        } else {
            // Reconnect: detach any stale sockets still bound to this player.
            self.conns.retain(|_, c| c.player_id != player_id);
            info!(room = %self.code, player = %player_id, "player reconnected");
        }

        // Any live connection cancels a pending grace removal.
        *self
            .grace_epochs
            .entry(player_id.to_string())
            .or_insert(0) += 1;

        self.conns.insert(
            conn_id,
            Conn {
                player_id: player_id.to_string(),
                tx,
            },
        );
        self.player_count.store(self.players.len(), Ordering::Relaxed);
        Ok(())
    }

    fn handle_client(&mut self, conn_id: Uuid, player_id: &str, msg: ClientMsg) -> ControlFlow<()> {
        if !self.players.contains_key(player_id) {
            debug!(room = %self.code, player = %player_id, "command from unknown player ignored");
            return ControlFlow::Continue(());
        }
        // A reconnect detaches older sockets for the same player; anything
        // still arriving on them is stale.
        if !self.conns.contains_key(&conn_id) {
            debug!(room = %self.code, player = %player_id, "command from detached connection ignored");
            return ControlFlow::Continue(());
        }

        match msg {
            ClientMsg::SetPlayerName { name } => {
                let Some(name) = sanitize_name(&name) else {
                    return ControlFlow::Continue(());
                };
                if let Some(p) = self.players.get_mut(player_id) {
                    p.name = name.clone();
                }
                if let Some(idx) = self.sim.player_index(player_id) {
                    self.sim.players[idx].name = name;
                }
                self.emit_room_state();
                if self.started {
                    self.emit_game_state();
                }
            }

            ClientMsg::SetWorld { world } => {
                self.apply_set_world(player_id, &world);
            }
            ClientMsg::SetLevel { level, world } => {
                let value = ClientMsg::level_value(&level, &world);
                self.apply_set_world(player_id, &value);
            }

            ClientMsg::SelectHero { hero } => {
                let taken = self
                    .players
                    .iter()
                    .any(|(id, p)| id != player_id && p.hero.as_deref() == Some(hero.as_str()));
                if taken {
                    self.send_to(
                        conn_id,
                        ServerMsg::HeroDenied {
                            message: "Hero already taken".to_string(),
                        },
                    );
                    return ControlFlow::Continue(());
                }
                if let Some(p) = self.players.get_mut(player_id) {
                    p.hero = Some(hero);
                    p.ready = false;
                }
                self.emit_room_state();
            }

            ClientMsg::SetReady { ready } => {
                let has_hero = self
                    .players
                    .get(player_id)
                    .map(|p| p.hero.is_some())
                    .unwrap_or(false);
                if !has_hero {
                    self.send_to(
                        conn_id,
                        ServerMsg::ReadyDenied {
                            message: "Pick a hero first".to_string(),
                        },
                    );
                    return ControlFlow::Continue(());
                }
                if let Some(p) = self.players.get_mut(player_id) {
                    p.ready = ready;
                }
                self.emit_room_state();
            }

            ClientMsg::StartGameNow => {
                if player_id != self.host_id {
                    self.send_to(
                        conn_id,
                        ServerMsg::StartDenied {
                            message: "Only the host can start the game".to_string(),
                        },
                    );
                    return ControlFlow::Continue(());
                }
                if self.players.values().any(|p| p.hero.is_none()) {
                    self.send_to(
                        conn_id,
                        ServerMsg::StartDenied {
                            message: "Everyone must pick a hero".to_string(),
                        },
                    );
                    return ControlFlow::Continue(());
                }
                if self.players.values().any(|p| !p.ready) {
                    self.send_to(
                        conn_id,
                        ServerMsg::StartDenied {
                            message: "Everyone must be ready".to_string(),
                        },
                    );
                    return ControlFlow::Continue(());
                }
                self.start_game();
            }

            ClientMsg::PlayerInput(payload) => {
                self.apply_input(player_id, payload);
            }

            ClientMsg::CreateRoom { .. } | ClientMsg::JoinRoom { .. } => {
                debug!(room = %self.code, player = %player_id, "room command on bound connection ignored");
            }
        }

        ControlFlow::Continue(())
    }

    fn apply_set_world(&mut self, player_id: &str, value: &Value) {
        if player_id != self.host_id {
            debug!(room = %self.code, player = %player_id, "setWorld from non-host ignored");
            return;
        }
        if self.started {
            debug!(room = %self.code, "setWorld while started ignored");
            return;
        }
        self.world = WorldId::normalize(value);
        self.sim = Simulation::new(self.world, self.world2_base_y, GameStatus::Waiting);
        self.inputs.clear();
        self.emit_room_state();
        self.emit_game_state();
    }

    fn start_game(&mut self) {
        self.started = true;
        self.sim = Simulation::new(self.world, self.world2_base_y, GameStatus::Playing);
        self.sync_sim_players();
        self.inputs.clear();
        self.last_step_at = None;
        info!(room = %self.code, world = self.world.as_u8(), "game started");
        self.broadcast(ServerMsg::StartGame);
        self.emit_room_state();
        self.emit_game_state();
    }

    fn apply_input(&mut self, player_id: &str, payload: InputPayload) {
        if !self.started {
            return;
        }
        self.inputs.insert(player_id.to_string(), payload.frame());

        // Clients report their canvas height so the world 2 ground can sit
        // at the bottom of their viewport.
        if self.world == WorldId::DangerButtons {
            if let Some(height) = payload.viewport() {
                let base = world::base_y_for_viewport(height);
                if (base - self.world2_base_y).abs() >= 2.0 {
                    self.world2_base_y = base;
                    self.sim.rebase(base);
                    self.emit_game_state();
                }
            }
        }
    }

    /// One simulation tick: scale by wallclock, advance platforms, step
    /// players in slot order, evaluate the round, broadcast.
    fn step(&mut self) {
        let now = unix_millis();
        let nominal_ms = 1000.0 / f64::from(self.config.tick_rate);
        let elapsed_ms = match self.last_step_at {
            Some(t) => (now.saturating_sub(t)) as f64,
            None => nominal_ms,
        };
        self.last_step_at = Some(now);
        let dt_scale = (elapsed_ms / nominal_ms).clamp(0.5, 2.5);

        self.sim.world.step_platforms(dt_scale);
        self.sync_sim_players();

        let respawn = self.config.respawn_delay_ms;
        for pid in &self.player_order {
            if let Some(idx) = self.sim.player_index(pid) {
                let input = self.inputs.get(pid).copied().unwrap_or_default();
                physics::step_player(&mut self.sim, idx, input, dt_scale, now, respawn);
            }
        }

        round::evaluate(&mut self.sim, self.players.len(), now, respawn);
        self.emit_game_state();
    }

    /// Make the simulation roster match the lobby roster.
    fn sync_sim_players(&mut self) {
        for pid in &self.player_order {
            if let Some(lp) = self.players.get(pid) {
                self.sim
                    .ensure_player(lp.slot, pid, lp.hero.clone(), &lp.name);
            }
        }
    }

    fn remove_player(&mut self, player_id: &str) -> ControlFlow<()> {
        self.players.remove(player_id);
        self.player_order.retain(|id| id != player_id);
        self.sim.remove_player(player_id);
        self.inputs.remove(player_id);
        self.grace_epochs.remove(player_id);
        self.player_count.store(self.players.len(), Ordering::Relaxed);
        info!(room = %self.code, player = %player_id, "player removed after grace");

        if self.players.is_empty() {
            return ControlFlow::Break(());
        }

        if self.host_id == player_id {
            if let Some(next) = self.player_order.first() {
                self.host_id = next.clone();
                info!(room = %self.code, host = %self.host_id, "host transferred");
            }
        }

        self.emit_room_state();
        self.emit_game_state();
        ControlFlow::Continue(())
    }

    fn arm_grace(&mut self, player_id: &str) {
        let epoch = {
            let e = self
                .grace_epochs
                .entry(player_id.to_string())
                .or_insert(0);
            *e += 1;
            *e
        };
        let tx = self.cmd_tx.clone();
        let pid = player_id.to_string();
        let grace = Duration::from_millis(self.config.disconnect_grace_ms);
        debug!(room = %self.code, player = %pid, "grace timer armed");
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let _ = tx
                .send(RoomCommand::GraceExpired {
                    player_id: pid,
                    epoch,
                })
                .await;
        });
    }

    fn has_live_connection(&self, player_id: &str) -> bool {
        self.conns.values().any(|c| c.player_id == player_id)
    }

    /// Lowest slot number not held by a current member.
    fn next_free_slot(&self) -> u8 {
        (1..=self.max_players)
            .find(|slot| !self.players.values().any(|p| p.slot == *slot))
            .unwrap_or(self.max_players)
    }

    fn slot_of(&self, player_id: &str) -> u8 {
        self.players.get(player_id).map(|p| p.slot).unwrap_or(0)
    }

    fn send_join_success(&mut self, conn_id: Uuid, player_id: &str) {
        let msg = ServerMsg::JoinSuccess {
            room_code: self.code.clone(),
            player_id: player_id.to_string(),
            player_index: self.slot_of(player_id),
            message: format!("Joined room {}", self.code),
        };
        self.send_to(conn_id, msg);
    }

    fn send_to(&self, conn_id: Uuid, msg: ServerMsg) {
        if let Some(conn) = self.conns.get(&conn_id) {
            if conn.tx.try_send(msg).is_err() {
                warn!(room = %self.code, player = %conn.player_id, "direct send failed");
            }
        }
    }

    /// Fan a message out to every live connection. Lobby messages warn on a
    /// saturated client queue; snapshots are dropped silently there since the
    /// next tick replaces them anyway.
    fn broadcast(&self, msg: ServerMsg) {
        let lossy = matches!(msg, ServerMsg::GameState(_));
        for conn in self.conns.values() {
            if conn.tx.try_send(msg.clone()).is_err() && !lossy {
                warn!(room = %self.code, player = %conn.player_id, "broadcast send failed");
            }
        }
    }

    fn emit_room_state(&mut self) {
        let payload = snapshot::room_state(
            &self.code,
            self.max_players,
            &self.host_id,
            self.started,
            self.world,
            &self.players,
        );
        self.broadcast(ServerMsg::RoomState(payload));
    }

    fn emit_game_state(&mut self) {
        self.sync_sim_players();
        let payload = snapshot::game_state(&self.sim);
        self.broadcast(ServerMsg::GameState(payload));
    }
}
