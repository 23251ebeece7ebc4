//! Level catalog: static blueprints and the mutable per-round world runtime.
//!
//! Blueprints are code, not data files. `runtime()` builds a fresh mutable
//! copy for each round; the simulation never touches a shared blueprint.

use serde::Serialize;

use super::geometry::Aabb;

/// Player collider dimensions, fixed for every hero.
pub const PLAYER_WIDTH: f64 = 45.0;
pub const PLAYER_HEIGHT: f64 = 55.0;

/// How far below groundY a body may fall before it counts as lost.
pub const FALL_OUT_MARGIN: f64 = 300.0;

/// Level identifier. Serialized as its numeric id on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorldId {
    /// World 1: open parkour over a pit, momentum preserved in the air.
    Parkour,
    /// World 2: flat ground studded with danger buttons, stop-on-release.
    DangerButtons,
}

impl WorldId {
    pub fn as_u8(self) -> u8 {
        match self {
            WorldId::Parkour => 1,
            WorldId::DangerButtons => 2,
        }
    }

    /// Normalize the many shapes clients send for a world selection:
    /// numbers, numeric strings, and "map1"/"world2" style names.
    /// Anything unrecognized falls back to world 1.
    pub fn normalize(value: &serde_json::Value) -> WorldId {
        if let Some(n) = value.as_u64() {
            return if n == 2 {
                WorldId::DangerButtons
            } else {
                WorldId::Parkour
            };
        }
        if let Some(s) = value.as_str() {
            return match s.trim().to_ascii_lowercase().as_str() {
                "2" | "map2" | "world2" => WorldId::DangerButtons,
                _ => WorldId::Parkour,
            };
        }
        WorldId::Parkour
    }
}

/// Physics constants carried by each world runtime.
#[derive(Debug, Clone, Copy)]
pub struct PhysicsParams {
    pub gravity: f64,
    pub move_speed: f64,
    pub jump_force: f64,
    pub max_fall_speed: f64,
    pub friction: f64,
}

/// A platform that patrols horizontally between two x bounds.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MovingPlatform {
    #[serde(flatten)]
    pub rect: Aabb,
    pub start_x: f64,
    pub end_x: f64,
    pub speed: f64,
    /// +1.0 moving right, -1.0 moving left.
    pub direction: f64,
    /// Horizontal displacement applied this tick, used for carrying riders.
    pub delta_x: f64,
}

/// A platform that drops away shortly after being stood on.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FallingPlatform {
    #[serde(flatten)]
    pub rect: Aabb,
    pub original_y: f64,
    pub falling: bool,
    pub fall_timer: u32,
}

/// Mutable world state for one round. Deep copy of a blueprint.
#[derive(Debug, Clone)]
pub struct WorldRuntime {
    pub id: WorldId,
    pub width: f64,
    pub ground_y: f64,
    pub has_global_floor: bool,
    pub stop_on_release: bool,
    pub params: PhysicsParams,
    pub platforms: Vec<Aabb>,
    pub moving_platforms: Vec<MovingPlatform>,
    pub falling_platforms: Vec<FallingPlatform>,
    pub key: Aabb,
    pub door: Aabb,
    pub danger_buttons: Vec<Aabb>,
}

impl WorldRuntime {
    /// Spawn height for a fresh player: planted on the ground strip, or on
    /// top of the first platform in worlds without a global floor.
    pub fn spawn_y(&self) -> f64 {
        if self.has_global_floor {
            self.ground_y - PLAYER_HEIGHT
        } else {
            self.platforms
                .first()
                .map(|p| p.y - PLAYER_HEIGHT)
                .unwrap_or(self.ground_y - PLAYER_HEIGHT)
        }
    }

    /// Vertical cutoff past which a body is lost to the pit.
    pub fn fall_out_y(&self) -> f64 {
        self.ground_y + FALL_OUT_MARGIN
    }

    /// Advance moving and falling platforms by one tick.
    ///
    /// Moving platforms reverse at their patrol bounds and record the
    /// displacement so grounded riders can be carried. Falling platforms hold
    /// for 30 ticks once armed, then descend.
    pub fn step_platforms(&mut self, dt_scale: f64) {
        for mp in &mut self.moving_platforms {
            let before = mp.rect.x;
            mp.rect.x += mp.speed * mp.direction * dt_scale;
            if mp.rect.x <= mp.start_x {
                mp.rect.x = mp.start_x;
                mp.direction = 1.0;
            } else if mp.rect.x >= mp.end_x {
                mp.rect.x = mp.end_x;
                mp.direction = -1.0;
            }
            mp.delta_x = mp.rect.x - before;
        }

        for fp in &mut self.falling_platforms {
            if fp.falling {
                fp.fall_timer += 1;
                if fp.fall_timer > 30 {
                    fp.rect.y += 8.0 * dt_scale;
                }
            }
        }
    }
}

/// Clamp a client-reported viewport height to a usable world 2 ground base.
pub fn base_y_for_viewport(height: f64) -> f64 {
    (height.round() - 80.0).clamp(500.0, 1400.0)
}

/// Default world 2 base when no viewport has been reported yet.
pub const DEFAULT_WORLD2_BASE_Y: f64 = 820.0;

/// Build a fresh runtime for the given world. `base_y` positions world 2
/// geometry; world 1 ignores it.
pub fn runtime(id: WorldId, base_y: f64) -> WorldRuntime {
    match id {
        WorldId::Parkour => parkour(),
        WorldId::DangerButtons => danger_buttons(base_y),
    }
}

/// World 1: a parkour chain over a bottomless pit. Horizontal momentum is
/// kept in the air (friction 1.0) and there is no global floor.
fn parkour() -> WorldRuntime {
    let platforms = vec![
        Aabb::new(50.0, 580.0, 320.0, 20.0),
        Aabb::new(450.0, 520.0, 180.0, 20.0),
        Aabb::new(700.0, 460.0, 160.0, 20.0),
        Aabb::new(940.0, 530.0, 170.0, 20.0),
        Aabb::new(1190.0, 470.0, 180.0, 20.0),
        Aabb::new(1450.0, 545.0, 200.0, 20.0),
        Aabb::new(1730.0, 480.0, 170.0, 20.0),
        Aabb::new(1930.0, 575.0, 220.0, 20.0),
        Aabb::new(2230.0, 505.0, 180.0, 20.0),
        Aabb::new(2490.0, 555.0, 190.0, 20.0),
        Aabb::new(2760.0, 495.0, 150.0, 20.0),
        Aabb::new(2950.0, 600.0, 400.0, 20.0),
        Aabb::new(3430.0, 540.0, 180.0, 20.0),
        Aabb::new(3690.0, 480.0, 170.0, 20.0),
        Aabb::new(3940.0, 550.0, 200.0, 20.0),
        Aabb::new(4220.0, 490.0, 180.0, 20.0),
        Aabb::new(4480.0, 560.0, 190.0, 20.0),
        Aabb::new(4750.0, 500.0, 170.0, 20.0),
        Aabb::new(5000.0, 570.0, 210.0, 20.0),
        Aabb::new(5290.0, 510.0, 180.0, 20.0),
        Aabb::new(5550.0, 580.0, 290.0, 20.0),
    ];

    WorldRuntime {
        id: WorldId::Parkour,
        width: 6000.0,
        ground_y: 650.0,
        has_global_floor: false,
        stop_on_release: false,
        params: PhysicsParams {
            gravity: 1.0,
            move_speed: 4.5,
            jump_force: -14.0,
            max_fall_speed: 15.0,
            friction: 1.0,
        },
        platforms,
        moving_platforms: Vec::new(),
        falling_platforms: Vec::new(),
        key: Aabb::new(1950.0, 535.0, 40.0, 40.0),
        door: Aabb::new(3030.0, 525.0, 55.0, 75.0),
        danger_buttons: Vec::new(),
    }
}

/// World 2: a single ground strip with 31 evenly spaced danger buttons.
/// All geometry hangs off `base_y`, which tracks the client viewport.
fn danger_buttons(base_y: f64) -> WorldRuntime {
    let mut platforms = vec![Aabb::new(0.0, base_y, 8200.0, 80.0)];
    for i in 0..16 {
        platforms.push(Aabb::new(
            300.0 + f64::from(i) * 480.0,
            base_y - 85.0,
            150.0,
            18.0,
        ));
    }

    let buttons = (0..31)
        .map(|i| Aabb::new(360.0 + f64::from(i) * 240.0, base_y - 18.0, 46.0, 18.0))
        .collect();

    let moving_platforms = vec![
        MovingPlatform {
            rect: Aabb::new(1200.0, base_y - 170.0, 140.0, 18.0),
            start_x: 1200.0,
            end_x: 1700.0,
            speed: 1.6,
            direction: 1.0,
            delta_x: 0.0,
        },
        MovingPlatform {
            rect: Aabb::new(4200.0, base_y - 170.0, 140.0, 18.0),
            start_x: 4200.0,
            end_x: 4800.0,
            speed: 2.0,
            direction: 1.0,
            delta_x: 0.0,
        },
    ];

    let falling_platforms = [(2400.0, 160.0), (3300.0, 160.0), (5600.0, 160.0)]
        .into_iter()
        .map(|(x, drop)| {
            let y = base_y - drop;
            FallingPlatform {
                rect: Aabb::new(x, y, 120.0, 18.0),
                original_y: y,
                falling: false,
                fall_timer: 0,
            }
        })
        .collect();

    WorldRuntime {
        id: WorldId::DangerButtons,
        width: 8200.0,
        ground_y: base_y,
        has_global_floor: true,
        stop_on_release: true,
        params: PhysicsParams {
            gravity: 1.0,
            move_speed: 4.5,
            jump_force: -14.0,
            max_fall_speed: 15.0,
            friction: 0.8,
        },
        platforms,
        moving_platforms,
        falling_platforms,
        key: Aabb::new(4250.0, base_y - 300.0, 40.0, 40.0),
        door: Aabb::new(7980.0, base_y - 75.0, 55.0, 75.0),
        danger_buttons: buttons,
    }
}
