use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use bevy::prelude::Vec2;
use serde::Serialize;

use crate::envelope::MovementEnvelope;

/// Integer coordinate in the planning lattice.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct GridPoint {
    pub x: i32,
    pub y: i32,
}

impl GridPoint {
    pub const ZERO: GridPoint = GridPoint { x: 0, y: 0 };

    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    pub fn manhattan(self, other: GridPoint) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }
}

/// Inclusive rectangle of grid points bounding a search.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridRect {
    pub min: GridPoint,
    pub max: GridPoint,
}

impl GridRect {
    pub fn around(center: GridPoint, margin: i32) -> Self {
        Self {
            min: center.offset(-margin, -margin),
            max: center.offset(margin, margin),
        }
    }

    pub fn contains(&self, p: GridPoint) -> bool {
        self.min.x <= p.x && p.x <= self.max.x && self.min.y <= p.y && p.y <= self.max.y
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    None,
    Walk,
    Fall,
    Jump,
    Climb,
}

/// One move toward the goal: performing `kind` from `pos` reaches the
/// position of `next`.
#[derive(Clone, Debug)]
pub struct PlanAction {
    pub pos: GridPoint,
    pub kind: ActionKind,
    /// Index of the successor in the owning [`PlanMap`].
    pub next: Option<usize>,
    /// Total cost from `pos` to the goal.
    pub cost: u32,
}

/// What a planning agent must provide: position queries, legality
/// predicates over grid points, and the movement commands the executor
/// issues.
pub trait PlanActor {
    fn grid_pos(&self) -> GridPoint;
    fn envelope(&self) -> &MovementEnvelope;
    fn is_landed(&self) -> bool;
    fn is_holding(&self) -> bool;
    /// Whether displacing the live hit-box by `v` is currently unobstructed.
    fn is_movable(&self, v: Vec2) -> bool;
    /// Displacement from the live hit-box to the hit-box at `p`.
    fn displacement_to(&self, p: GridPoint) -> Vec2;
    fn can_move_to(&self, p: GridPoint) -> bool;
    fn can_grab_at(&self, p: GridPoint) -> bool;
    fn can_stand_at(&self, p: GridPoint) -> bool;
    fn can_climb_up(&self, p: GridPoint) -> bool;
    fn can_climb_down(&self, p: GridPoint) -> bool;
    fn can_fall(&self, p0: GridPoint, p1: GridPoint) -> bool;
    fn can_jump(&self, p0: GridPoint, p1: GridPoint) -> bool;
    fn move_toward(&mut self, p: GridPoint);
    fn jump_toward(&mut self, p: GridPoint);
    /// Drop any requested movement.
    fn halt(&mut self);
    /// Hand the requested movement to physics for this tick.
    fn apply_movement(&mut self);
}

#[derive(Default, Clone, Copy, Debug)]
pub struct PlannerCounters {
    pub searches: u64,
    pub expansions: u64,
}

/// Discovered moves toward a fixed goal, keyed by grid point.
///
/// Actions live in an append-only arena; `index` maps each point to its
/// cheapest known action. Replacing a point never rewrites older actions,
/// so every chain keeps consistent costs.
#[derive(Clone, Debug)]
pub struct PlanMap {
    goal: GridPoint,
    start: Option<GridPoint>,
    actions: Vec<PlanAction>,
    index: HashMap<GridPoint, usize>,
    frontier: BinaryHeap<Reverse<(u32, u64, usize)>>,
    seq: u64,
}

impl PlanMap {
    pub fn new(goal: GridPoint) -> Self {
        let mut plan = Self {
            goal,
            start: None,
            actions: Vec::new(),
            index: HashMap::new(),
            frontier: BinaryHeap::new(),
            seq: 0,
        };
        plan.add_action(
            PlanAction {
                pos: goal,
                kind: ActionKind::None,
                next: None,
                cost: 0,
            },
            u32::MAX,
        );
        plan
    }

    pub fn goal(&self) -> GridPoint {
        self.goal
    }

    pub fn start(&self) -> Option<GridPoint> {
        self.start
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn action(&self, idx: usize) -> &PlanAction {
        &self.actions[idx]
    }

    pub fn action_index_at(&self, p: GridPoint) -> Option<usize> {
        self.index.get(&p).copied()
    }

    pub fn action_at(&self, p: GridPoint) -> Option<&PlanAction> {
        self.action_index_at(p).map(|idx| &self.actions[idx])
    }

    pub fn next_of(&self, action: &PlanAction) -> Option<&PlanAction> {
        action.next.map(|idx| &self.actions[idx])
    }

    /// The live actions, one per discovered point.
    pub fn actions(&self) -> impl Iterator<Item = &PlanAction> {
        self.index.values().map(|&idx| &self.actions[idx])
    }

    /// Follow `next` links from `p` to the goal.
    pub fn chain_from(&self, p: GridPoint) -> Vec<&PlanAction> {
        let mut chain = Vec::new();
        let mut cur = self.action_at(p);
        while let Some(action) = cur {
            chain.push(action);
            cur = self.next_of(action);
        }
        chain
    }

    fn add_action(&mut self, action: PlanAction, max_cost: u32) -> bool {
        if action.cost > max_cost {
            return false;
        }
        if let Some(&prev) = self.index.get(&action.pos) {
            if self.actions[prev].cost <= action.cost {
                return false;
            }
        }
        let h = self.start.map_or(0, |s| s.manhattan(action.pos));
        let idx = self.actions.len();
        self.index.insert(action.pos, idx);
        self.frontier
            .push(Reverse((action.cost.saturating_add(h), self.seq, idx)));
        self.seq += 1;
        self.actions.push(action);
        true
    }

    fn link(&mut self, pos: GridPoint, kind: ActionKind, next: usize, dc: u32, max_cost: u32) {
        let cost = self.actions[next].cost + dc;
        self.add_action(
            PlanAction {
                pos,
                kind,
                next: Some(next),
                cost,
            },
            max_cost,
        );
    }

    /// Search backward from the goal until `start` is reached (`true`) or no
    /// candidate inside `range` within `max_cost` remains (`false`). Without
    /// a start the whole reachable region is mapped and the result is
    /// always `false`.
    pub fn fill<A: PlanActor + ?Sized>(
        &mut self,
        actor: &A,
        range: GridRect,
        start: Option<GridPoint>,
        max_cost: u32,
        counters: &mut PlannerCounters,
    ) -> bool {
        counters.searches = counters.searches.saturating_add(1);
        self.start = start;
        let envelope = actor.envelope();

        while let Some(Reverse((_, _, i0))) = self.frontier.pop() {
            let p = self.actions[i0].pos;
            if self.index.get(&p) != Some(&i0) {
                // Superseded by a cheaper route.
                continue;
            }
            if start == Some(p) {
                return true;
            }
            counters.expansions = counters.expansions.saturating_add(1);
            let kind0 = self.actions[i0].kind;

            // Climb down from above.
            let dp = p.offset(0, -1);
            if range.contains(dp) && actor.can_climb_down(dp) {
                self.link(dp, ActionKind::Climb, i0, 1, max_cost);
            }
            // Climb up from below.
            let up = p.offset(0, 1);
            if range.contains(up) && actor.can_climb_up(up) {
                self.link(up, ActionKind::Climb, i0, 1, max_cost);
            }

            for vx in [-1, 1] {
                let wp = p.offset(-vx, 0);
                if range.contains(wp)
                    && actor.can_move_to(wp)
                    && (actor.can_grab_at(wp) || actor.can_stand_at(wp))
                {
                    self.link(wp, ActionKind::Walk, i0, 1, max_cost);
                }

                //  +--+....  [vx = +1]
                //  |  |....
                //  +-X+.... fp: where the fall starts
                // ##.......
                //   ...+--+
                //   ...|  |
                //   ...+-X+ p: landing
                //     ######
                for v in envelope.falls() {
                    if v.x == 0 && vx < 0 {
                        continue;
                    }
                    let fp = p.offset(-v.x * vx, -v.y);
                    if !range.contains(fp) || !actor.can_move_to(fp) {
                        continue;
                    }
                    if actor.can_fall(fp, p) && actor.can_stand_at(p) {
                        let dc = v.x.unsigned_abs() + v.y.unsigned_abs();
                        self.link(fp, ActionKind::Fall, i0, dc, max_cost);
                    }
                }

                // A jump always arcs into a fall before landing.
                if kind0 == ActionKind::Fall {
                    //  ....+--+  [vx = +1]
                    //  ....|  |
                    //  ....+-X+ p: apex
                    //  .......
                    //  +--+...
                    //  |  |...
                    //  +-X+... jp: takeoff
                    // ######
                    for v in envelope.jumps() {
                        if v.x == 0 && vx < 0 {
                            continue;
                        }
                        let jp = p.offset(-v.x * vx, -v.y);
                        if !range.contains(jp) || !actor.can_move_to(jp) {
                            continue;
                        }
                        if actor.can_jump(jp, p) && (actor.can_grab_at(jp) || actor.can_stand_at(jp))
                        {
                            let dc = v.x.unsigned_abs() + v.y.unsigned_abs();
                            self.link(jp, ActionKind::Jump, i0, dc, max_cost);
                        }
                    }
                }
            }
        }

        false
    }

    #[cfg(test)]
    pub(crate) fn from_chain(steps: &[(GridPoint, ActionKind)]) -> Self {
        let (goal, _) = *steps.last().expect("chain needs a goal");
        let mut plan = Self::new(goal);
        plan.frontier.clear();
        let mut next = 0;
        for &(pos, kind) in steps.iter().rev().skip(1) {
            plan.link(pos, kind, next, 1, u32::MAX);
            next = plan.index[&pos];
        }
        plan.frontier.clear();
        plan
    }
}


#[cfg(test)]
mod tests {
    use super::test_world::GridWorld;
    use super::*;

    fn kinds(plan: &PlanMap, from: GridPoint) -> Vec<ActionKind> {
        plan.chain_from(from).iter().map(|a| a.kind).collect()
    }

    #[test]
    fn flat_ground_plan_is_five_walks() {
        let world = GridWorld::flat(-15, 15, 1);
        let goal = GridPoint::new(0, 0);
        let start = GridPoint::new(5, 0);
        let mut plan = PlanMap::new(goal);
        let mut counters = PlannerCounters::default();
        assert!(plan.fill(&world, GridRect::around(goal, 10), Some(start), 5, &mut counters));

        let chain = plan.chain_from(start);
        assert_eq!(chain.len(), 6);
        assert!(chain[..5].iter().all(|a| a.kind == ActionKind::Walk));
        assert_eq!(chain[5].pos, goal);
        assert_eq!(chain[5].cost, 0);
        assert_eq!(chain[0].cost, 5);
        assert_eq!(counters.searches, 1);
        assert!(counters.expansions > 0);
    }

    #[test]
    fn chain_costs_decrease_toward_goal() {
        let world = GridWorld::flat(-15, 15, 1);
        let goal = GridPoint::new(0, 0);
        let mut plan = PlanMap::new(goal);
        let mut counters = PlannerCounters::default();
        plan.fill(&world, GridRect::around(goal, 10), None, 20, &mut counters);
        for action in plan.actions() {
            match plan.next_of(action) {
                Some(next) => assert!(action.cost > next.cost),
                None => {
                    assert_eq!(action.pos, goal);
                    assert_eq!(action.cost, 0);
                }
            }
        }
    }

    #[test]
    fn cost_ceiling_below_distance_fails() {
        let world = GridWorld::flat(-15, 15, 1);
        let goal = GridPoint::new(0, 0);
        let mut plan = PlanMap::new(goal);
        let mut counters = PlannerCounters::default();
        assert!(!plan.fill(
            &world,
            GridRect::around(goal, 10),
            Some(GridPoint::new(5, 0)),
            4,
            &mut counters
        ));
        assert!(plan.action_at(GridPoint::new(5, 0)).is_none());
        assert!(plan.actions().all(|a| a.cost <= 4));
    }

    #[test]
    fn start_outside_region_reports_failure() {
        let world = GridWorld::flat(-40, 40, 1);
        let goal = GridPoint::new(0, 0);
        let start = GridPoint::new(25, 0);
        let mut plan = PlanMap::new(goal);
        let mut counters = PlannerCounters::default();
        assert!(!plan.fill(&world, GridRect::around(goal, 10), Some(start), 20, &mut counters));
        assert!(plan.actions().all(|a| GridRect::around(goal, 10).contains(a.pos)));
    }

    #[test]
    fn ladder_plan_is_five_climbs() {
        let mut world = GridWorld::new();
        for y in 0..=5 {
            world.ladder.insert(GridPoint::new(0, y));
        }
        let goal = GridPoint::new(0, 0);
        let start = GridPoint::new(0, 5);
        let mut plan = PlanMap::new(goal);
        let mut counters = PlannerCounters::default();
        assert!(plan.fill(&world, GridRect::around(goal, 10), Some(start), 20, &mut counters));

        assert_eq!(
            kinds(&plan, start),
            vec![ActionKind::Climb; 5]
                .into_iter()
                .chain([ActionKind::None])
                .collect::<Vec<_>>()
        );
        assert_eq!(plan.action_at(start).map(|a| a.cost), Some(5));
    }

    #[test]
    fn ledge_drop_uses_a_fall() {
        // Upper ledge at y=0 for x <= 0; lower ground at y=4.
        let mut world = GridWorld::flat(-15, 15, 5);
        for x in -15..=0 {
            world.floor.insert(GridPoint::new(x, 1));
        }
        let goal = GridPoint::new(4, 4);
        let start = GridPoint::new(0, 0);
        let mut plan = PlanMap::new(goal);
        let mut counters = PlannerCounters::default();
        assert!(plan.fill(&world, GridRect::around(goal, 10), Some(start), 20, &mut counters));
        assert!(kinds(&plan, start).contains(&ActionKind::Fall));
    }

    #[test]
    fn step_up_needs_a_jump_into_a_fall() {
        // Ground at y=4, a raised block whose top surface is y=1 for x >= 6.
        let mut world = GridWorld::flat(-15, 15, 5);
        for x in 6..=15 {
            for y in 2..5 {
                world.floor.insert(GridPoint::new(x, y));
            }
        }
        let goal = GridPoint::new(8, 1);
        let start = GridPoint::new(2, 4);
        let mut plan = PlanMap::new(goal);
        let mut counters = PlannerCounters::default();
        assert!(plan.fill(&world, GridRect::around(goal, 10), Some(start), 20, &mut counters));

        let chain = kinds(&plan, start);
        let jump = chain
            .iter()
            .position(|k| *k == ActionKind::Jump)
            .expect("plan should jump");
        assert_eq!(chain[jump + 1], ActionKind::Fall);
    }

    #[test]
    fn unreachable_goal_exhausts_frontier() {
        let world = GridWorld::new();
        let goal = GridPoint::new(0, 0);
        let mut plan = PlanMap::new(goal);
        let mut counters = PlannerCounters::default();
        // Open air everywhere: nothing to stand on, nothing to climb.
        assert!(!plan.fill(
            &world,
            GridRect::around(goal, 10),
            Some(GridPoint::new(3, 0)),
            20,
            &mut counters
        ));
        assert_eq!(plan.len(), 1);
    }

    #[test]
    fn region_contains_is_inclusive() {
        let rect = GridRect::around(GridPoint::new(2, -1), 3);
        assert!(rect.contains(GridPoint::new(5, 2)));
        assert!(rect.contains(GridPoint::new(-1, -4)));
        assert!(!rect.contains(GridPoint::new(6, 0)));
    }
}
