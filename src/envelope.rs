use std::collections::HashSet;
use std::sync::Arc;

use bevy::prelude::*;

use crate::components::GameConfig;
use crate::physics_core::JumpCurve;
use crate::plan_map::GridPoint;

/// Grid offsets reachable from a standing start by a jump (up to its apex)
/// and by an unforced fall. Offsets are stored facing right; callers mirror
/// them for leftward motion.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MovementEnvelope {
    jumps: Vec<GridPoint>,
    falls: Vec<GridPoint>,
}

#[derive(Default)]
struct OffsetSet {
    seen: HashSet<GridPoint>,
    points: Vec<GridPoint>,
}

impl OffsetSet {
    /// Record every cell from the horizontal origin to `x` on the row that
    /// contains `y`. Cells are sampled at whole pixels, so nothing is
    /// recorded left of the origin.
    fn add_row(&mut self, x: f32, y: f32, grid_size: f32) {
        if x < 0.0 {
            return;
        }
        let cy = (y / grid_size).ceil() as i32;
        let max_cx = (x.floor() / grid_size + 0.5).floor() as i32;
        for cx in 0..=max_cx {
            let c = GridPoint::new(cx, cy);
            if c == GridPoint::ZERO {
                continue;
            }
            if self.seen.insert(c) {
                self.points.push(c);
            }
        }
    }
}

impl MovementEnvelope {
    /// Simulate the jump and fall arcs of a physics profile.
    ///
    /// `step(vy, elapsed)` advances vertical velocity by one tick, with
    /// `elapsed == None` meaning the jump button is released.
    ///
    /// Panics on a non-positive or non-finite grid size, a non-finite speed
    /// or a zero horizon.
    pub fn compute(
        step: impl Fn(f32, Option<u32>) -> f32,
        speed: f32,
        grid_size: f32,
        horizon: u32,
    ) -> Self {
        assert!(
            grid_size.is_finite() && grid_size > 0.0,
            "grid size must be positive, got {grid_size}"
        );
        assert!(speed.is_finite(), "speed must be finite, got {speed}");
        assert!(horizon > 0, "envelope horizon must be at least one tick");

        let mut jumps = OffsetSet::default();
        for release in 1..horizon {
            let mut p = Vec2::ZERO;
            let mut vy = 0.0;
            for t in 0..horizon {
                vy = if t < release { step(vy, Some(t)) } else { step(vy, None) };
                if vy >= 0.0 {
                    jumps.add_row(p.x, p.y, grid_size);
                    break;
                }
                p.x += speed;
                p.y += vy;
            }
        }

        let mut falls = OffsetSet::default();
        let mut p = Vec2::ZERO;
        let mut vy = 0.0;
        for _ in 0..horizon {
            vy = step(vy, None);
            p.x += speed;
            p.y += vy;
            falls.add_row(p.x, p.y, grid_size);
        }

        Self {
            jumps: jumps.points,
            falls: falls.points,
        }
    }

    pub fn from_curve(curve: &JumpCurve, speed: f32, grid_size: f32, horizon: u32) -> Self {
        Self::compute(|vy, t| curve.step(vy, t), speed, grid_size, horizon)
    }

    pub fn jumps(&self) -> &[GridPoint] {
        &self.jumps
    }

    pub fn falls(&self) -> &[GridPoint] {
        &self.falls
    }
}

/// Everything agents sharing one physics profile plan with. Immutable once
/// built; share it through an `Arc`.
#[derive(Debug)]
pub struct PlannerProfile {
    pub tile_size: f32,
    pub grid_size: f32,
    pub speed: f32,
    pub action_timeout: Option<u32>,
    pub curve: JumpCurve,
    pub envelope: MovementEnvelope,
}

impl PlannerProfile {
    /// Panics on invalid sizes or speeds; see [`MovementEnvelope::compute`].
    pub fn new(config: &GameConfig) -> Self {
        assert!(
            config.tile_size.is_finite() && config.tile_size > 0.0,
            "tile size must be positive, got {}",
            config.tile_size
        );
        let curve = JumpCurve::from_config(config);
        let envelope = MovementEnvelope::from_curve(
            &curve,
            config.move_speed,
            config.grid_size,
            config.envelope_horizon,
        );
        Self {
            tile_size: config.tile_size,
            grid_size: config.grid_size,
            speed: config.move_speed,
            action_timeout: config.action_timeout,
            curve,
            envelope,
        }
    }

    pub fn coord2grid(&self, p: Vec2) -> GridPoint {
        let gs = self.grid_size;
        GridPoint::new(
            (p.x / gs + 0.5).floor() as i32,
            (p.y / gs + 0.5).floor() as i32,
        )
    }

    pub fn grid2coord(&self, p: GridPoint) -> Vec2 {
        Vec2::new(p.x as f32 * self.grid_size, p.y as f32 * self.grid_size)
    }
}

/// The profile handed to every planning agent at spawn.
#[derive(Resource, Clone)]
pub struct SharedProfile(pub Arc<PlannerProfile>);

#[cfg(test)]
mod tests {
    use super::*;

    fn default_envelope() -> MovementEnvelope {
        let config = GameConfig::default();
        PlannerProfile::new(&config).envelope
    }

    fn assert_nonzero_unique(points: &[GridPoint]) {
        let unique: HashSet<_> = points.iter().copied().collect();
        assert_eq!(unique.len(), points.len(), "offsets must be unique");
        assert!(!points.contains(&GridPoint::ZERO));
    }

    #[test]
    fn offsets_are_nonzero_and_unique() {
        let envelope = default_envelope();
        assert!(!envelope.jumps().is_empty());
        assert!(!envelope.falls().is_empty());
        assert_nonzero_unique(envelope.jumps());
        assert_nonzero_unique(envelope.falls());
    }

    #[test]
    fn jump_apexes_rise_and_falls_descend() {
        let envelope = default_envelope();
        assert!(envelope.jumps().iter().all(|p| p.y < 0 && p.x >= 0));
        assert!(envelope.falls().iter().all(|p| p.y > 0 && p.x >= 0));
    }

    #[test]
    fn shortest_jump_reaches_expected_apex() {
        // Release after one tick: -6 then -5..-1, apex 21px up after 6 ticks.
        let envelope = default_envelope();
        for cx in 0..=3 {
            assert!(envelope.jumps().contains(&GridPoint::new(cx, -2)));
        }
        assert!(!envelope.jumps().contains(&GridPoint::new(4, -2)));
    }

    #[test]
    fn first_fall_tick_covers_origin_column() {
        let envelope = default_envelope();
        assert_eq!(envelope.falls()[0], GridPoint::new(0, 1));
        assert_eq!(envelope.falls()[1], GridPoint::new(1, 1));
    }

    #[test]
    fn computation_is_deterministic() {
        assert_eq!(default_envelope(), default_envelope());
    }

    #[test]
    fn stationary_fall_has_no_horizontal_spread() {
        let envelope = MovementEnvelope::compute(|vy, _| vy + 2.0, 0.0, 8.0, 6);
        assert!(envelope.falls().iter().all(|p| p.x == 0));
        assert_nonzero_unique(envelope.falls());
        assert!(envelope.jumps().is_empty());
    }

    #[test]
    fn row_cells_are_sampled_at_whole_pixels() {
        // One tick: x = 4.5, y = 2. Pixel 4 maps to cell 1, never cell 2.
        let envelope = MovementEnvelope::compute(|vy, _| vy + 2.0, 4.5, 3.0, 1);
        assert_eq!(
            envelope.falls(),
            &[GridPoint::new(0, 1), GridPoint::new(1, 1)]
        );
    }

    #[test]
    fn backward_drift_records_nothing() {
        let envelope = MovementEnvelope::compute(|vy, _| vy + 2.0, -2.0, 8.0, 3);
        assert!(envelope.falls().is_empty());
    }

    #[test]
    #[should_panic(expected = "grid size must be positive")]
    fn rejects_non_positive_grid_size() {
        MovementEnvelope::compute(|vy, _| vy + 1.0, 4.0, 0.0, 15);
    }

    #[test]
    #[should_panic(expected = "speed must be finite")]
    fn rejects_non_finite_speed() {
        MovementEnvelope::compute(|vy, _| vy + 1.0, f32::NAN, 8.0, 15);
    }

    #[test]
    fn coord_grid_round_trip_snaps_to_nearest_cell() {
        let profile = PlannerProfile::new(&GameConfig::default());
        assert_eq!(profile.coord2grid(Vec2::new(11.9, 4.0)), GridPoint::new(1, 1));
        assert_eq!(profile.coord2grid(Vec2::new(12.0, -4.1)), GridPoint::new(2, -1));
        assert_eq!(profile.grid2coord(GridPoint::new(3, -2)), Vec2::new(24.0, -16.0));
    }
}
