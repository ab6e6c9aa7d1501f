use crate::components::{Body, GameConfig, TileType};
use crate::tilemap::Tilemap;

/// Axis-aligned box in world pixels (y grows downward).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl Aabb {
    pub fn from_center(x: f32, y: f32, width: f32, height: f32) -> Self {
        let hw = width / 2.0;
        let hh = height / 2.0;
        Self {
            min_x: x - hw,
            min_y: y - hh,
            max_x: x + hw,
            max_y: y + hh,
        }
    }

    pub fn translate(self, dx: f32, dy: f32) -> Self {
        Self {
            min_x: self.min_x + dx,
            min_y: self.min_y + dy,
            max_x: self.max_x + dx,
            max_y: self.max_y + dy,
        }
    }

    pub fn union(self, other: Aabb) -> Self {
        Self {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }
}

#[derive(Default, Clone, Copy)]
pub struct PhysicsCounters {
    pub collision_checks: u64,
}

/// Vertical velocity stepping rule shared by the simulation and the
/// envelope calculator.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct JumpCurve {
    pub jump_speed: f32,
    pub hold_ticks: u32,
    pub gravity: f32,
    pub max_fall_speed: f32,
}

impl JumpCurve {
    pub fn from_config(config: &GameConfig) -> Self {
        Self {
            jump_speed: config.jump_speed,
            hold_ticks: config.jump_hold_ticks,
            gravity: config.gravity,
            max_fall_speed: config.max_fall_speed,
        }
    }

    /// Next vertical velocity. `elapsed` is the number of ticks the jump has
    /// been held, or `None` once it is released (or was never pressed).
    pub fn step(&self, vy: f32, elapsed: Option<u32>) -> f32 {
        match elapsed {
            Some(t) if t < self.hold_ticks => -self.jump_speed,
            _ => (vy + self.gravity).min(self.max_fall_speed),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct MotionResult {
    pub x: f32,
    pub y: f32,
    pub blocked_x: bool,
    pub blocked_y: bool,
}

#[derive(Clone, Copy)]
pub struct MotionParams {
    pub tile_size: f32,
    pub x: f32,
    pub y: f32,
    pub dx: f32,
    pub dy: f32,
    pub width: f32,
    pub height: f32,
    /// Ignore ladder tops while moving down.
    pub drop_through: bool,
}

#[derive(Clone, Copy)]
struct LandingProbe {
    x: f32,
    prev_y: f32,
    new_y: f32,
    width: f32,
    height: f32,
    tile_size: f32,
}

pub fn resolve_motion(
    tilemap: &Tilemap,
    params: MotionParams,
    counters: &mut PhysicsCounters,
) -> MotionResult {
    let MotionParams {
        tile_size,
        x,
        y,
        dx,
        dy,
        width,
        height,
        drop_through,
    } = params;
    let mut out_x = x;
    let mut out_y = y;
    let mut blocked_x = false;
    let mut blocked_y = false;

    let new_x = out_x + dx;
    let x_aabb = Aabb::from_center(new_x, out_y, width, height);
    if !collides_solid(tilemap, &x_aabb, tile_size, counters) {
        out_x = new_x;
    } else {
        if dx > 0.0 {
            let tile_x = ((x_aabb.max_x - 0.01) / tile_size).floor() as i32;
            out_x = tile_x as f32 * tile_size - width / 2.0;
        } else if dx < 0.0 {
            let tile_x = (x_aabb.min_x / tile_size).floor() as i32;
            out_x = (tile_x + 1) as f32 * tile_size + width / 2.0;
        }
        blocked_x = true;
    }

    let new_y = out_y + dy;
    let y_aabb = Aabb::from_center(out_x, new_y, width, height);
    let landing_y = if dy > 0.0 && !drop_through {
        find_ladder_top_landing(
            tilemap,
            LandingProbe {
                x: out_x,
                prev_y: out_y,
                new_y,
                width,
                height,
                tile_size,
            },
            counters,
        )
    } else {
        None
    };

    if !collides_solid(tilemap, &y_aabb, tile_size, counters) && landing_y.is_none() {
        out_y = new_y;
    } else {
        if let Some(land_y) = landing_y {
            out_y = land_y;
        } else if dy > 0.0 {
            let tile_y = ((y_aabb.max_y - 0.01) / tile_size).floor() as i32;
            out_y = tile_y as f32 * tile_size - height / 2.0;
        } else if dy < 0.0 {
            let tile_y = (y_aabb.min_y / tile_size).floor() as i32;
            out_y = (tile_y + 1) as f32 * tile_size + height / 2.0;
        }
        blocked_y = true;
    }

    MotionResult {
        x: out_x,
        y: out_y,
        blocked_x,
        blocked_y,
    }
}

/// Whether the body is resting on a floor tile or on top of a ladder.
pub fn compute_grounded(
    tilemap: &Tilemap,
    tile_size: f32,
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    counters: &mut PhysicsCounters,
) -> bool {
    let bottom = y + height / 2.0;
    let check_y = bottom + 0.5;
    let left_x = x - width / 2.0 + 1.0;
    let right_x = x + width / 2.0 - 1.0;

    let left_tile_x = (left_x / tile_size).floor() as i32;
    let right_tile_x = (right_x / tile_size).floor() as i32;
    let tile_y = (check_y / tile_size).floor() as i32;

    for tx in left_tile_x..=right_tile_x {
        counters.collision_checks = counters.collision_checks.saturating_add(1);
        if tilemap.get(tx, tile_y).is_solid() {
            return true;
        }
        if is_ladder_top(tilemap, tx, tile_y) && bottom <= tile_y as f32 * tile_size + 0.01 {
            return true;
        }
    }
    false
}

pub fn overlaps_type(
    tilemap: &Tilemap,
    aabb: &Aabb,
    tile_size: f32,
    target: TileType,
    counters: &mut PhysicsCounters,
) -> bool {
    let min_tx = (aabb.min_x / tile_size).floor() as i32;
    let max_tx = ((aabb.max_x - 0.01) / tile_size).floor() as i32;
    let min_ty = (aabb.min_y / tile_size).floor() as i32;
    let max_ty = ((aabb.max_y - 0.01) / tile_size).floor() as i32;

    for ty in min_ty..=max_ty {
        for tx in min_tx..=max_tx {
            counters.collision_checks = counters.collision_checks.saturating_add(1);
            if tilemap.get(tx, ty) == target {
                return true;
            }
        }
    }
    false
}

pub fn collides_solid(
    tilemap: &Tilemap,
    aabb: &Aabb,
    tile_size: f32,
    counters: &mut PhysicsCounters,
) -> bool {
    overlaps_type(tilemap, aabb, tile_size, TileType::Floor, counters)
}

fn is_ladder_top(tilemap: &Tilemap, tx: i32, ty: i32) -> bool {
    tilemap.get(tx, ty).is_climbable() && !tilemap.get(tx, ty - 1).is_climbable()
}

fn find_ladder_top_landing(
    tilemap: &Tilemap,
    probe: LandingProbe,
    counters: &mut PhysicsCounters,
) -> Option<f32> {
    let LandingProbe {
        x,
        prev_y,
        new_y,
        width,
        height,
        tile_size,
    } = probe;
    let prev_bottom = prev_y + height / 2.0;
    let new_bottom = new_y + height / 2.0;
    if new_bottom <= prev_bottom {
        return None;
    }

    let left_x = x - width / 2.0 + 0.01;
    let right_x = x + width / 2.0 - 0.01;
    let left_tile_x = (left_x / tile_size).floor() as i32;
    let right_tile_x = (right_x / tile_size).floor() as i32;
    let min_ty = (prev_bottom / tile_size).floor() as i32;
    let max_ty = (new_bottom / tile_size).floor() as i32;

    let mut best_top: Option<f32> = None;
    for ty in min_ty..=max_ty {
        let top = ty as f32 * tile_size;
        if prev_bottom > top + 0.01 || new_bottom < top {
            continue;
        }
        for tx in left_tile_x..=right_tile_x {
            counters.collision_checks = counters.collision_checks.saturating_add(1);
            if is_ladder_top(tilemap, tx, ty) {
                best_top = Some(best_top.map_or(top, |curr| curr.min(top)));
            }
        }
    }
    best_top.map(|top| top - height / 2.0)
}

/// Advance one body by a single physics tick, consuming its requested
/// movement and jump trigger.
pub fn step_body(
    tilemap: &Tilemap,
    body: &mut Body,
    curve: &JumpCurve,
    tile_size: f32,
    counters: &mut PhysicsCounters,
) {
    body.holding = overlaps_type(tilemap, &body.hitbox(), tile_size, TileType::Ladder, counters);
    if std::mem::take(&mut body.jump_requested) && body.grounded && !body.holding {
        body.jump_ticks = Some(0);
    }

    // Requested vertical movement only counts on a ladder; anywhere else an
    // actor can merely hurry its own fall.
    let climb_dy = if body.holding {
        body.movement.y
    } else {
        body.movement.y.max(0.0)
    };
    if body.holding && body.jump_ticks.is_none() {
        body.velocity.y = 0.0;
    } else {
        body.velocity.y = curve.step(body.velocity.y, body.jump_ticks);
        body.jump_ticks = body
            .jump_ticks
            .map(|t| t + 1)
            .filter(|t| *t < curve.hold_ticks);
    }

    let out = resolve_motion(
        tilemap,
        MotionParams {
            tile_size,
            x: body.center.x,
            y: body.center.y,
            dx: body.movement.x,
            dy: climb_dy + body.velocity.y,
            width: body.size.x,
            height: body.size.y,
            drop_through: body.movement.y > 0.0,
        },
        counters,
    );
    body.velocity.x = if out.blocked_x { 0.0 } else { body.movement.x };
    if out.blocked_y {
        body.velocity.y = 0.0;
        body.jump_ticks = None;
    }
    body.center.x = out.x;
    body.center.y = out.y;
    body.grounded = compute_grounded(
        tilemap,
        tile_size,
        out.x,
        out.y,
        body.size.x,
        body.size.y,
        counters,
    );
    body.holding = overlaps_type(tilemap, &body.hitbox(), tile_size, TileType::Ladder, counters);
}
