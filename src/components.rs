use bevy::prelude::*;

use crate::physics_core::Aabb;

#[derive(Clone, Copy, PartialEq, Eq, Debug, serde::Serialize, serde::Deserialize)]
#[repr(u8)]
pub enum TileType {
    Empty = 0,
    Floor = 1,
    Ladder = 2,
}

impl TileType {
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => TileType::Floor,
            2 => TileType::Ladder,
            _ => TileType::Empty,
        }
    }

    pub fn is_solid(self) -> bool {
        self == TileType::Floor
    }

    pub fn is_climbable(self) -> bool {
        self == TileType::Ladder
    }

    /// Anything an actor can stand on top of.
    pub fn is_stoppable(self) -> bool {
        matches!(self, TileType::Floor | TileType::Ladder)
    }
}

/// Physics and planning constants (as a resource so they can be tuned).
///
/// Speeds are in pixels per tick; the world is y-down.
#[derive(Resource, Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub tile_size: f32,
    /// Spacing of the planning lattice. Half a tile by default.
    pub grid_size: f32,
    pub move_speed: f32,
    pub jump_speed: f32,
    pub jump_hold_ticks: u32,
    pub gravity: f32,
    pub max_fall_speed: f32,
    pub envelope_horizon: u32,
    /// Ticks allowed per plan action; `None` never times out.
    pub action_timeout: Option<u32>,
    pub region_margin: i32,
    pub max_cost: u32,
    pub agent_width: f32,
    pub agent_height: f32,
    pub repath_interval: u32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            tile_size: 16.0,
            grid_size: 8.0,
            move_speed: 4.0,
            jump_speed: 6.0,
            jump_hold_ticks: 4,
            gravity: 1.0,
            max_fall_speed: 8.0,
            envelope_horizon: 15,
            action_timeout: Some(30),
            region_margin: 10,
            max_cost: 20,
            agent_width: 16.0,
            agent_height: 16.0,
            repath_interval: 30,
        }
    }
}

/// Physical state of a simulated character plus the commands it was given
/// for the next physics step.
#[derive(Component, Clone, Debug, Default)]
pub struct Body {
    pub center: Vec2,
    pub size: Vec2,
    pub velocity: Vec2,
    /// Requested displacement for the next tick, applied by physics.
    pub movement: Vec2,
    pub jump_requested: bool,
    /// Ticks since the current jump started; `None` once released.
    pub jump_ticks: Option<u32>,
    pub grounded: bool,
    pub holding: bool,
}

impl Body {
    pub fn new(center: Vec2, size: Vec2) -> Self {
        Self {
            center,
            size,
            ..default()
        }
    }

    pub fn hitbox(&self) -> Aabb {
        Aabb::from_center(self.center.x, self.center.y, self.size.x, self.size.y)
    }
}

/// Marks the body other agents chase.
#[derive(Component)]
pub struct Target;

/// Re-plans toward `target` every `repath_interval` ticks.
#[derive(Component)]
pub struct Chaser {
    pub target: Entity,
    pub countdown: u32,
}
