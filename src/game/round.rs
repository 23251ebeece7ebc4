//! Post-step round rules: key pickup, hazards, the door, death and respawn.

use super::world::WorldId;
use super::{GameStatus, Simulation};

/// Evaluate round state after every player has stepped. Order matters: a
/// pending respawn wins over everything, hazards win over the door.
pub fn evaluate(sim: &mut Simulation, present_players: usize, now_ms: u64, respawn_delay_ms: u64) {
    if sim.status == GameStatus::Dead {
        if sim.dead_until > 0 && now_ms >= sim.dead_until {
            sim.reset_round();
        }
        return;
    }

    // Key pickup latches for the rest of the round.
    if !sim.key_collected {
        let key = sim.world.key;
        if sim
            .players
            .iter()
            .any(|p| !p.dead && p.rect().intersects(&key))
        {
            sim.key_collected = true;
        }
    }

    // Danger buttons end the round for everyone.
    if sim.world.id == WorldId::DangerButtons {
        let touched = sim.players.iter().any(|p| {
            !p.dead && sim.world.danger_buttons.iter().any(|b| p.rect().intersects(b))
        });
        if touched {
            sim.status = GameStatus::Dead;
            sim.dead_until = now_ms + respawn_delay_ms;
            return;
        }
    }

    // The door opens only once the key is held; everyone present must be in.
    if sim.key_collected {
        let door = sim.world.door;
        sim.players_at_door = sim
            .players
            .iter()
            .filter(|p| !p.dead && p.rect().intersects(&door))
            .map(|p| p.id)
            .collect();
        if present_players > 0 && sim.players_at_door.len() == present_players {
            sim.status = GameStatus::Won;
            return;
        }
    } else {
        sim.players_at_door.clear();
    }

    sim.status = GameStatus::Playing;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::world::{self, WorldId, PLAYER_HEIGHT};
    use assert_approx_eq::assert_approx_eq;

    const RESPAWN_MS: u64 = 1800;

    fn sim_with_players(id: WorldId, count: u8) -> Simulation {
        let mut sim = Simulation::new(id, world::DEFAULT_WORLD2_BASE_Y, GameStatus::Playing);
        for slot in 1..=count {
            sim.ensure_player(slot, &format!("p{slot}"), None, &format!("Player {slot}"));
        }
        sim
    }

    fn put_on(sim: &mut Simulation, index: usize, target: crate::game::geometry::Aabb) {
        sim.players[index].x = target.x;
        sim.players[index].y = target.y;
        sim.players[index].prev_y = target.y;
    }

    #[test]
    fn key_pickup_latches_for_the_round() {
        let mut sim = sim_with_players(WorldId::Parkour, 1);
        let key = sim.world.key;
        put_on(&mut sim, 0, key);
        evaluate(&mut sim, 1, 0, RESPAWN_MS);
        assert!(sim.key_collected);

        // Walking away does not drop the key.
        sim.players[0].x = 100.0;
        evaluate(&mut sim, 1, 0, RESPAWN_MS);
        assert!(sim.key_collected);
    }

    #[test]
    fn all_players_at_door_with_key_wins() {
        let mut sim = sim_with_players(WorldId::Parkour, 2);
        sim.key_collected = true;
        let door = sim.world.door;
        put_on(&mut sim, 0, door);
        put_on(&mut sim, 1, door);
        evaluate(&mut sim, 2, 0, RESPAWN_MS);
        assert_eq!(sim.status, GameStatus::Won);
        assert_eq!(sim.players_at_door, vec![1, 2]);
    }

    #[test]
    fn partial_door_attendance_keeps_playing() {
        let mut sim = sim_with_players(WorldId::Parkour, 2);
        sim.key_collected = true;
        let door = sim.world.door;
        put_on(&mut sim, 0, door);
        evaluate(&mut sim, 2, 0, RESPAWN_MS);
        assert_eq!(sim.status, GameStatus::Playing);
        assert_eq!(sim.players_at_door, vec![1]);
    }

    #[test]
    fn door_without_key_does_nothing() {
        let mut sim = sim_with_players(WorldId::Parkour, 1);
        let door = sim.world.door;
        put_on(&mut sim, 0, door);
        evaluate(&mut sim, 1, 0, RESPAWN_MS);
        assert_eq!(sim.status, GameStatus::Playing);
        assert!(sim.players_at_door.is_empty());
    }

    #[test]
    fn danger_button_kills_the_round() {
        let mut sim = sim_with_players(WorldId::DangerButtons, 1);
        let button = sim.world.danger_buttons[0];
        put_on(&mut sim, 0, button);
        evaluate(&mut sim, 1, 7000, RESPAWN_MS);
        assert_eq!(sim.status, GameStatus::Dead);
        assert_eq!(sim.dead_until, 7000 + RESPAWN_MS);
    }

    #[test]
    fn dead_round_respawns_after_deadline() {
        let mut sim = sim_with_players(WorldId::DangerButtons, 1);
        sim.key_collected = true;
        sim.status = GameStatus::Dead;
        sim.dead_until = 5000;
        sim.players[0].dead = true;
        sim.players[0].x = 4000.0;

        // Before the deadline nothing changes.
        evaluate(&mut sim, 1, 4000, RESPAWN_MS);
        assert_eq!(sim.status, GameStatus::Dead);
        assert!(sim.key_collected);

        evaluate(&mut sim, 1, 5000, RESPAWN_MS);
        assert_eq!(sim.status, GameStatus::Playing);
        assert!(!sim.key_collected);
        assert_eq!(sim.dead_until, 0);
        let p = &sim.players[0];
        assert!(!p.dead);
        assert_approx_eq!(p.x, 100.0);
        assert_approx_eq!(p.y, sim.world.ground_y - PLAYER_HEIGHT);
    }

    #[test]
    fn dead_players_do_not_collect_or_win() {
        let mut sim = sim_with_players(WorldId::Parkour, 1);
        sim.players[0].dead = true;
        let key = sim.world.key;
        put_on(&mut sim, 0, key);
        // Not yet past the deadline, status playing path with a dead body.
        sim.status = GameStatus::Playing;
        evaluate(&mut sim, 1, 0, RESPAWN_MS);
        assert!(!sim.key_collected);
    }
}
