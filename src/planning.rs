use std::sync::Arc;

use bevy::prelude::*;

use crate::components::Body;
use crate::envelope::{MovementEnvelope, PlannerProfile};
use crate::physics_core::{step_body, Aabb, PhysicsCounters};
use crate::plan_map::{GridPoint, GridRect, PlanActor, PlanMap, PlannerCounters};
use crate::plan_runner::PlanRunner;
use crate::tilemap::{RangeMap, TileRanges, Tilemap};

/// Per-agent planning state: at most one plan in flight.
#[derive(Debug)]
pub struct Planner {
    profile: Arc<PlannerProfile>,
    runner: Option<PlanRunner>,
    counters: PlannerCounters,
}

impl Planner {
    pub fn new(profile: Arc<PlannerProfile>) -> Self {
        Self {
            profile,
            runner: None,
            counters: PlannerCounters::default(),
        }
    }

    pub fn counters(&self) -> PlannerCounters {
        self.counters
    }

    pub fn has_active_plan(&self) -> bool {
        self.runner.is_some()
    }

    pub fn plan(&self) -> Option<&PlanMap> {
        self.runner.as_ref().map(PlanRunner::plan)
    }

    /// Plan toward `target` (world coordinates). Keeps the current plan when
    /// it already heads for the same grid point. Returns whether a plan is
    /// active afterwards.
    pub fn request_plan<A: PlanActor + ?Sized>(
        &mut self,
        actor: &mut A,
        target: Vec2,
        region_margin: i32,
        max_cost: u32,
    ) -> bool {
        let goal = self.profile.coord2grid(target);
        if self.runner.as_ref().is_some_and(|r| r.goal() == goal) {
            return true;
        }
        self.cancel_plan(actor);

        let start = actor.grid_pos();
        let mut plan = PlanMap::new(goal);
        let range = GridRect::around(goal, region_margin);
        if plan.fill(actor, range, Some(start), max_cost, &mut self.counters) {
            debug!(
                "plan {:?} -> {:?}: {} steps of {} actions, cost {}",
                start,
                goal,
                plan.chain_from(start).len(),
                plan.len(),
                plan.action_at(start).map_or(0, |a| a.cost)
            );
            self.runner = Some(PlanRunner::new(plan, actor, self.profile.action_timeout));
            true
        } else {
            debug!("no plan {:?} -> {:?} within cost {}", start, goal, max_cost);
            false
        }
    }

    /// Drop the active plan, if any, and stop the actor.
    pub fn cancel_plan<A: PlanActor + ?Sized>(&mut self, actor: &mut A) {
        if let Some(runner) = self.runner.take() {
            trace!("dropping plan to {:?}", runner.goal());
            actor.halt();
        }
    }

    /// Run the active plan for one tick; a finished or stalled plan is
    /// cancelled. Returns whether the plan is still running.
    pub fn tick_plan<A: PlanActor + ?Sized>(&mut self, actor: &mut A) -> bool {
        let Some(runner) = self.runner.as_mut() else {
            return false;
        };
        if runner.update(actor) {
            trace!(
                "following {:?}, {:?} ticks left",
                runner.current(),
                runner.remaining()
            );
            return true;
        }
        if actor.grid_pos() != runner.goal() {
            debug!(
                "plan to {:?} stalled at {:?} (action at {:?})",
                runner.goal(),
                actor.grid_pos(),
                runner.current()
            );
        }
        self.cancel_plan(actor);
        false
    }

    /// Tick the plan, then let physics apply whatever movement was asked for.
    pub fn advance<A: PlanActor + ?Sized>(&mut self, actor: &mut A) {
        self.tick_plan(actor);
        actor.apply_movement();
    }
}

/// A [`Body`] in a tile world, seen through the planning lattice.
pub struct TileActor<'a> {
    pub body: &'a mut Body,
    pub tilemap: &'a Tilemap,
    pub ranges: &'a TileRanges,
    pub profile: &'a PlannerProfile,
    pub counters: &'a mut PhysicsCounters,
}

impl TileActor<'_> {
    /// The body's hit-box centred on grid point `p`.
    fn hitbox_at(&self, p: GridPoint) -> Aabb {
        let c = self.profile.grid2coord(p);
        Aabb::from_center(c.x, c.y, self.body.size.x, self.body.size.y)
    }

    fn any(&self, map: &RangeMap, aabb: &Aabb) -> bool {
        map.exists(self.tilemap.coord2map(aabb, self.profile.tile_size))
    }
}

impl PlanActor for TileActor<'_> {
    fn grid_pos(&self) -> GridPoint {
        self.profile.coord2grid(self.body.center)
    }

    fn envelope(&self) -> &MovementEnvelope {
        &self.profile.envelope
    }

    fn is_landed(&self) -> bool {
        self.body.grounded
    }

    fn is_holding(&self) -> bool {
        self.body.holding
    }

    fn is_movable(&self, v: Vec2) -> bool {
        !self.any(&self.ranges.obstacle, &self.body.hitbox().translate(v.x, v.y))
    }

    fn displacement_to(&self, p: GridPoint) -> Vec2 {
        self.profile.grid2coord(p) - self.body.center
    }

    fn can_move_to(&self, p: GridPoint) -> bool {
        !self.any(&self.ranges.obstacle, &self.hitbox_at(p))
    }

    fn can_grab_at(&self, p: GridPoint) -> bool {
        self.any(&self.ranges.grabbable, &self.hitbox_at(p))
    }

    fn can_stand_at(&self, p: GridPoint) -> bool {
        let hb = self.hitbox_at(p).translate(0.0, self.profile.grid_size);
        self.any(&self.ranges.stoppable, &hb)
    }

    fn can_climb_up(&self, p: GridPoint) -> bool {
        self.any(&self.ranges.grabbable, &self.hitbox_at(p))
    }

    fn can_climb_down(&self, p: GridPoint) -> bool {
        let hb = self.hitbox_at(p).translate(0.0, self.body.size.y);
        self.any(&self.ranges.grabbable, &hb)
    }

    fn can_fall(&self, p0: GridPoint, p1: GridPoint) -> bool {
        // The corridor skips the take-off column so a fall may start from
        // the lip of a ledge.
        let hb0 = self.hitbox_at(p0);
        let hb1 = self.hitbox_at(p1);
        let x0 = hb0.max_x.min(hb1.min_x);
        let x1 = hb0.min_x.max(hb1.max_x);
        let corridor = Aabb {
            min_x: x0.min(x1),
            min_y: hb0.min_y.min(hb1.min_y),
            max_x: x0.max(x1),
            max_y: hb0.max_y.max(hb1.max_y),
        };
        !self.any(&self.ranges.stoppable, &corridor)
    }

    fn can_jump(&self, p0: GridPoint, p1: GridPoint) -> bool {
        let swept = self.hitbox_at(p0).union(self.hitbox_at(p1));
        !self.any(&self.ranges.stoppable, &swept)
    }

    fn move_toward(&mut self, p: GridPoint) {
        let speed = self.profile.speed;
        let d = self.profile.grid2coord(p) - self.body.center;
        self.body.movement = d.clamp(Vec2::splat(-speed), Vec2::splat(speed));
    }

    fn jump_toward(&mut self, p: GridPoint) {
        self.move_toward(p);
        self.body.jump_requested = true;
    }

    fn halt(&mut self) {
        self.body.movement = Vec2::ZERO;
    }

    fn apply_movement(&mut self) {
        step_body(
            self.tilemap,
            self.body,
            &self.profile.curve,
            self.profile.tile_size,
            self.counters,
        );
    }
}
