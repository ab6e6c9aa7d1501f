use crate::plan_map::{ActionKind, GridPoint, PlanActor, PlanMap};

/// Drives an actor along the chain of a finished [`PlanMap`], one action at
/// a time.
#[derive(Debug)]
pub struct PlanRunner {
    plan: PlanMap,
    action: Option<usize>,
    timeout: Option<u32>,
    count: Option<u32>,
}

#[derive(Clone, Copy)]
struct PathEntry {
    p: GridPoint,
    d: u32,
    prev: Option<(usize, usize)>,
}

impl PlanRunner {
    /// Start from whatever action the plan holds for the actor's current
    /// position. `timeout` bounds the ticks spent on each action.
    pub fn new<A: PlanActor + ?Sized>(plan: PlanMap, actor: &A, timeout: Option<u32>) -> Self {
        let action = plan.action_index_at(actor.grid_pos());
        Self {
            plan,
            action,
            timeout,
            count: timeout,
        }
    }

    pub fn plan(&self) -> &PlanMap {
        &self.plan
    }

    pub fn goal(&self) -> GridPoint {
        self.plan.goal()
    }

    pub fn current(&self) -> Option<GridPoint> {
        self.action.map(|idx| self.plan.action(idx).pos)
    }

    /// Ticks left for the current action; `None` when unbounded.
    pub fn remaining(&self) -> Option<u32> {
        self.count
    }

    fn advance(&mut self, next: usize) {
        self.action = Some(next);
        self.count = self.timeout;
    }

    /// Run one tick. Returns `false` once there is nothing left to do, either
    /// because the goal was reached or because the current action ran out of
    /// time; callers tell those apart from the actor's state.
    pub fn update<A: PlanActor + ?Sized>(&mut self, actor: &mut A) -> bool {
        let Some(idx) = self.action else {
            return false;
        };
        let (kind, Some(next)) = (self.plan.action(idx).kind, self.plan.action(idx).next) else {
            return false;
        };
        if let Some(count) = self.count.as_mut() {
            if *count == 0 {
                return false;
            }
            *count -= 1;
        }

        let cur = actor.grid_pos();
        let dst = self.plan.action(next).pos;

        match kind {
            ActionKind::None => {}
            ActionKind::Walk | ActionKind::Climb => {
                actor.move_toward(dst);
                if cur == dst {
                    self.advance(next);
                }
            }
            ActionKind::Fall => {
                let path = find_simple_path(actor, cur, dst);
                if let Some(&p) = path
                    .iter()
                    .find(|p| actor.is_movable(actor.displacement_to(**p)))
                {
                    actor.move_toward(p);
                }
                if cur == dst {
                    self.advance(next);
                }
            }
            ActionKind::Jump => {
                if actor.is_landed() && !actor.is_holding() && actor.can_jump(cur, dst) {
                    actor.jump_toward(dst);
                    // Committed the moment it leaves the ground.
                    self.advance(next);
                } else {
                    actor.move_toward(cur);
                }
            }
        }

        true
    }
}

/// Straight-ahead path from `p0` to `p1` without detours, listed from `p1`
/// back to `p0`.
///
/// Sweeps the rectangle between the two points in the direction of travel;
/// each cell takes the cheaper of its two neighbours behind it, and only
/// cells the actor can occupy are reachable. When `p1` cannot be reached the
/// result is the partial chain recorded at `p1`.
pub fn find_simple_path<A: PlanActor + ?Sized>(
    actor: &A,
    p0: GridPoint,
    p1: GridPoint,
) -> Vec<GridPoint> {
    let w = p1.x.abs_diff(p0.x) as usize;
    let h = p1.y.abs_diff(p0.y) as usize;
    let inf = ((w + h + 1) * 2) as u32;
    let vx = if p0.x <= p1.x { 1 } else { -1 };
    let vy = if p0.y <= p1.y { 1 } else { -1 };

    let mut a: Vec<Vec<PathEntry>> = Vec::with_capacity(h + 1);
    for dy in 0..=h {
        let y = p0.y + dy as i32 * vy;
        let mut row: Vec<PathEntry> = Vec::with_capacity(w + 1);
        for dx in 0..=w {
            let x = p0.x + dx as i32 * vx;
            let p = GridPoint::new(x, y);
            let mut prev = None;
            let d = if dx == 0 && dy == 0 {
                0
            } else {
                let mut d = inf;
                if actor.can_move_to(p) {
                    if dx > 0 && row[dx - 1].d < d {
                        prev = Some((dy, dx - 1));
                        d = row[dx - 1].d;
                    }
                    if dy > 0 && a[dy - 1][dx].d < d {
                        prev = Some((dy - 1, dx));
                        d = a[dy - 1][dx].d;
                    }
                }
                d + 1
            };
            row.push(PathEntry { p, d, prev });
        }
        a.push(row);
    }

    let mut path = Vec::new();
    let mut cur = Some((h, w));
    while let Some((dy, dx)) = cur {
        let e = a[dy][dx];
        path.push(e.p);
        cur = e.prev;
    }
    path
}
