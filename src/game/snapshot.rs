//! Builds the broadcast payloads from room and simulation state.

use std::collections::{BTreeMap, HashMap};

use crate::ws::protocol::{GameStatePayload, RoomStatePayload};

use super::room::LobbyPlayer;
use super::world::WorldId;
use super::Simulation;

/// Lobby view of a room.
pub fn room_state(
    room_code: &str,
    max_players: u8,
    host_id: &str,
    started: bool,
    world: WorldId,
    players: &HashMap<String, LobbyPlayer>,
) -> RoomStatePayload {
    RoomStatePayload {
        room_code: room_code.to_string(),
        max_players,
        host_id: host_id.to_string(),
        started,
        world: world.as_u8(),
        players: players
            .iter()
            .map(|(id, p)| (id.clone(), p.clone()))
            .collect::<BTreeMap<_, _>>(),
    }
}

/// Simulation view of a room, keyed by client player id.
pub fn game_state(sim: &Simulation) -> GameStatePayload {
    GameStatePayload {
        players: sim
            .players
            .iter()
            .map(|p| (p.client_player_id.clone(), p.clone()))
            .collect(),
        key_collected: sim.key_collected,
        players_at_door: sim.players_at_door.clone(),
        game_status: sim.status,
        world: sim.world.id.as_u8(),
        key: sim.world.key,
        door: sim.world.door,
        danger_buttons: sim.world.danger_buttons.clone(),
        moving_platforms: sim.world.moving_platforms.clone(),
        falling_platforms: sim.world.falling_platforms.clone(),
    }
}
