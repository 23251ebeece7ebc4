//! Per-player physics step: input integration, axis-separated collision
//! resolution, platform carry, and one-way player stacking.

use super::geometry::{clamp_x, Aabb};
use super::world::{PLAYER_HEIGHT, PLAYER_WIDTH};
use super::{GameStatus, InputFrame, PlayerState, Simulation};

/// Horizontal velocities below this snap to zero when gliding.
const VX_DEAD_ZONE: f64 = 0.1;

/// Outcome of a vertical collision test against one platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VHit {
    None,
    Landed,
    Bonked,
}

/// Advance one player by one tick. `dt_scale` is the wallclock-normalized
/// tick multiplier. A fall past the pit threshold marks the round dead and
/// arms the respawn deadline.
pub fn step_player(
    sim: &mut Simulation,
    index: usize,
    input: InputFrame,
    dt_scale: f64,
    now_ms: u64,
    respawn_delay_ms: u64,
) {
    // Bodies to stack against, captured before borrowing self mutably.
    // Resolution only ever moves self, so copies of the others suffice.
    let others: Vec<OtherBody> = sim
        .players
        .iter()
        .enumerate()
        .filter(|(j, p)| *j != index && !p.dead)
        .map(|(_, p)| OtherBody {
            slot: p.id,
            x: p.x,
            y: p.y,
            prev_y: p.prev_y,
        })
        .collect();

    let world = &mut sim.world;
    let Some(p) = sim.players.get_mut(index) else {
        return;
    };
    let params = world.params;

    // Horizontal intent.
    if input.left {
        p.vx = -params.move_speed;
        p.facing_right = false;
        p.anim_frame = (p.anim_frame + 1) % 4;
    } else if input.right {
        p.vx = params.move_speed;
        p.facing_right = true;
        p.anim_frame = (p.anim_frame + 1) % 4;
    } else {
        if world.stop_on_release && p.on_ground {
            p.vx = 0.0;
        } else {
            p.vx *= params.friction.powf(dt_scale);
            if p.vx.abs() < VX_DEAD_ZONE {
                p.vx = 0.0;
            }
        }
        p.anim_frame = 0;
    }

    // Jump.
    if input.jump && p.on_ground {
        p.vy = params.jump_force;
        p.on_ground = false;
    }

    // Collidables: statics, then moving platforms, then falling platforms
    // that have not yet dropped out of the playfield.
    let cutoff = world.fall_out_y();
    let solid: Vec<Aabb> = world
        .platforms
        .iter()
        .copied()
        .chain(world.moving_platforms.iter().map(|m| m.rect))
        .collect();
    let falling_rects: Vec<Aabb> = world
        .falling_platforms
        .iter()
        .filter(|f| f.rect.y < cutoff)
        .map(|f| f.rect)
        .collect();

    // Horizontal step.
    p.x += p.vx * dt_scale;
    p.x = clamp_x(p.x, world.width, p.width);
    let dir = p.vx;
    for c in solid.iter().chain(falling_rects.iter()) {
        if p.rect().intersects(c) {
            if dir > 0.0 {
                p.x = c.x - p.width;
            } else if dir < 0.0 {
                p.x = c.right();
            }
            p.vx = 0.0;
        }
    }

    // Vertical step.
    p.prev_y = p.y;
    p.vy += params.gravity * dt_scale;
    if p.vy > params.max_fall_speed {
        p.vy = params.max_fall_speed;
    }
    p.y += p.vy * dt_scale;
    p.on_ground = false;
    p.standing_on_player = None;

    // Vertical resolution. Landing on a falling platform arms its timer.
    for c in &solid {
        resolve_vertical(p, c);
    }
    for f in &mut world.falling_platforms {
        if f.rect.y >= cutoff {
            continue;
        }
        if resolve_vertical(p, &f.rect) == VHit::Landed && !f.falling {
            f.falling = true;
            f.fall_timer = 0;
        }
    }

    // Global floor.
    if world.has_global_floor && p.y + p.height > world.ground_y {
        p.y = world.ground_y - p.height;
        p.vy = 0.0;
        p.on_ground = true;
    }

    // Carry by the moving platform underfoot.
    if p.on_ground {
        let bottom = p.y + p.height;
        for m in &world.moving_platforms {
            let overlaps_x = p.x < m.rect.right() && p.x + p.width > m.rect.x;
            if overlaps_x && bottom >= m.rect.y - 8.0 && bottom <= m.rect.y + 10.0 {
                p.x += m.delta_x;
                p.x = clamp_x(p.x, world.width, p.width);
                break;
            }
        }
    }

    // Fall-out.
    let mut fell = false;
    if !p.dead && p.y > world.fall_out_y() {
        p.dead = true;
        fell = true;
    }

    if !p.dead {
        let width = world.width;
        resolve_against_others(p, &others, width);
    }

    if fell {
        sim.status = GameStatus::Dead;
        sim.dead_until = now_ms + respawn_delay_ms;
    }
}

/// Position snapshot of another living player, for stacking.
struct OtherBody {
    slot: u8,
    x: f64,
    y: f64,
    prev_y: f64,
}

fn resolve_vertical(p: &mut PlayerState, c: &Aabb) -> VHit {
    let overlaps_x = p.x < c.right() && p.x + p.width > c.x;
    if !overlaps_x {
        return VHit::None;
    }
    let prev_bottom = p.prev_y + p.height;
    let bottom = p.y + p.height;
    if p.vy >= 0.0 && prev_bottom <= c.y && bottom >= c.y {
        p.y = c.y - p.height;
        p.vy = 0.0;
        p.on_ground = true;
        return VHit::Landed;
    }
    if p.vy < 0.0 && p.prev_y >= c.bottom() && p.y <= c.bottom() {
        p.y = c.bottom();
        p.vy = 0.0;
        return VHit::Bonked;
    }
    VHit::None
}

/// Player-vs-player resolution. Only self moves: a side overlap pushes self
/// out horizontally, a vertical overlap stacks the higher body on top. The
/// lower player is never displaced, which keeps a pair from oscillating when
/// each resolves in its own turn.
fn resolve_against_others(p: &mut PlayerState, others: &[OtherBody], world_width: f64) {
    for o in others {
        let rect = Aabb::new(o.x, o.y, PLAYER_WIDTH, PLAYER_HEIGHT);
        if !p.rect().intersects(&rect) {
            continue;
        }

        let pen_left = p.x + p.width - o.x;
        let pen_right = rect.right() - p.x;
        let pen_top = p.y + p.height - o.y;
        let pen_bottom = rect.bottom() - p.y;
        let min_h = pen_left.min(pen_right);
        let min_v = pen_top.min(pen_bottom);

        if min_h < min_v {
            if pen_left < pen_right {
                p.x -= pen_left;
            } else {
                p.x += pen_right;
            }
            p.x = clamp_x(p.x, world_width, p.width);
            p.vx = 0.0;
            continue;
        }

        let self_prev_bottom = p.prev_y + p.height;
        let other_prev_bottom = o.prev_y + PLAYER_HEIGHT;
        let landing = p.vy >= 0.0
            && p.y < o.y
            && self_prev_bottom <= o.y + 12.0
            && p.y + p.height >= o.y;
        let underside = p.vy < 0.0 && p.prev_y >= other_prev_bottom - 8.0 && p.y <= rect.bottom();

        if landing || !underside {
            p.y = o.y - p.height;
            p.vy = 0.0;
            p.on_ground = true;
            p.standing_on_player = Some(o.slot);
        } else {
            p.y = rect.bottom();
            p.vy = 0.0;
        }
    }
}
