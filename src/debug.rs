use serde::Serialize;

use crate::plan_map::{ActionKind, GridPoint, PlanMap};

/// Serializable snapshot of a search result, for inspecting plans outside
/// the simulation.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct PlanDump {
    pub goal: GridPoint,
    pub start: Option<GridPoint>,
    pub actions: Vec<ActionDump>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ActionDump {
    pub pos: GridPoint,
    pub kind: ActionKind,
    pub cost: u32,
    pub next: Option<GridPoint>,
}

impl PlanMap {
    /// Live actions ordered top-to-bottom, then left-to-right.
    pub fn dump(&self) -> PlanDump {
        let mut actions: Vec<ActionDump> = self
            .actions()
            .map(|a| ActionDump {
                pos: a.pos,
                kind: a.kind,
                cost: a.cost,
                next: self.next_of(a).map(|n| n.pos),
            })
            .collect();
        actions.sort_by_key(|a| (a.pos.y, a.pos.x));
        PlanDump {
            goal: self.goal(),
            start: self.start(),
            actions,
        }
    }

    pub fn dump_json(&self) -> Result<String, String> {
        serde_json::to_string_pretty(&self.dump()).map_err(|e| e.to_string())
    }
}
