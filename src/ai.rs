use std::sync::Arc;

use bevy::prelude::*;

use crate::components::{Body, Chaser, GameConfig};
use crate::envelope::{PlannerProfile, SharedProfile};
use crate::physics_core::{step_body, PhysicsCounters};
use crate::planning::{Planner, TileActor};
use crate::tilemap::{TileRanges, Tilemap};

pub struct PlanningPlugin;

impl Plugin for PlanningPlugin {
    fn build(&self, app: &mut App) {
        let config = app
            .world()
            .get_resource::<GameConfig>()
            .cloned()
            .unwrap_or_default();
        let profile = PlannerProfile::new(&config);
        info!(
            "planner profile: {} jump / {} fall offsets",
            profile.envelope.jumps().len(),
            profile.envelope.falls().len()
        );

        app.insert_resource(config)
            .insert_resource(SharedProfile(Arc::new(profile)))
            .init_resource::<TileRanges>()
            .init_resource::<TickCount>()
            .init_resource::<PlannerStats>()
            .add_systems(
                FixedUpdate,
                (
                    refresh_tile_ranges,
                    update_chasers,
                    drive_planning_agents,
                    apply_passive_physics,
                    count_ticks,
                )
                    .chain()
                    .run_if(resource_exists::<Tilemap>),
            );
    }
}

/// A body steered by its own planner.
#[derive(Component, Debug)]
pub struct PlanningAgent(pub Planner);

impl PlanningAgent {
    pub fn new(profile: &SharedProfile) -> Self {
        Self(Planner::new(profile.0.clone()))
    }
}

/// Fixed ticks simulated so far.
#[derive(Resource, Default, Debug)]
pub struct TickCount(pub u64);

/// Totals across every planning agent.
#[derive(Resource, Default, Debug, Clone, Copy)]
pub struct PlannerStats {
    pub searches: u64,
    pub expansions: u64,
    pub collision_checks: u64,
    pub active_plans: usize,
}

fn refresh_tile_ranges(tilemap: Res<Tilemap>, mut ranges: ResMut<TileRanges>) {
    if tilemap.is_changed() {
        *ranges = TileRanges::build(&tilemap);
        debug!("rebuilt tile ranges for {}x{} map", tilemap.width, tilemap.height);
    }
}

fn update_chasers(
    config: Res<GameConfig>,
    tilemap: Res<Tilemap>,
    ranges: Res<TileRanges>,
    profile: Res<SharedProfile>,
    targets: Query<&Body, Without<PlanningAgent>>,
    mut agents: Query<(Entity, &mut Body, &mut PlanningAgent, &mut Chaser)>,
    mut stats: ResMut<PlannerStats>,
) {
    for (entity, mut body, mut agent, mut chaser) in agents.iter_mut() {
        if chaser.countdown > 0 {
            chaser.countdown -= 1;
            continue;
        }
        chaser.countdown = config.repath_interval;

        let Ok(target) = targets.get(chaser.target) else {
            warn!("{entity:?} is chasing missing target {:?}", chaser.target);
            continue;
        };
        let goal = target.center;
        let mut counters = PhysicsCounters::default();
        let mut actor = TileActor {
            body: &mut body,
            tilemap: &tilemap,
            ranges: &ranges,
            profile: &profile.0,
            counters: &mut counters,
        };
        if !agent
            .0
            .request_plan(&mut actor, goal, config.region_margin, config.max_cost)
        {
            debug!("{entity:?} found no plan toward {goal}");
        }
    }
    stats.searches = agents.iter().map(|(_, _, a, _)| a.0.counters().searches).sum();
}

fn drive_planning_agents(
    tilemap: Res<Tilemap>,
    ranges: Res<TileRanges>,
    profile: Res<SharedProfile>,
    mut agents: Query<(&mut Body, &mut PlanningAgent)>,
    mut stats: ResMut<PlannerStats>,
) {
    let mut counters = PhysicsCounters::default();
    let mut expansions = 0;
    let mut active = 0;
    for (mut body, mut agent) in agents.iter_mut() {
        let mut actor = TileActor {
            body: &mut body,
            tilemap: &tilemap,
            ranges: &ranges,
            profile: &profile.0,
            counters: &mut counters,
        };
        agent.0.advance(&mut actor);
        expansions += agent.0.counters().expansions;
        if agent.0.has_active_plan() {
            active += 1;
        }
    }
    stats.expansions = expansions;
    stats.active_plans = active;
    stats.collision_checks = stats
        .collision_checks
        .saturating_add(counters.collision_checks);
}

/// Bodies nobody plans for still fall and land.
fn apply_passive_physics(
    tilemap: Res<Tilemap>,
    profile: Res<SharedProfile>,
    mut bodies: Query<&mut Body, Without<PlanningAgent>>,
    mut stats: ResMut<PlannerStats>,
) {
    let mut counters = PhysicsCounters::default();
    for mut body in bodies.iter_mut() {
        step_body(
            &tilemap,
            &mut body,
            &profile.0.curve,
            profile.0.tile_size,
            &mut counters,
        );
    }
    stats.collision_checks = stats
        .collision_checks
        .saturating_add(counters.collision_checks);
}

fn count_ticks(mut ticks: ResMut<TickCount>) {
    ticks.0 += 1;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::Target;

    fn spawn_body(app: &App, tile: (i32, i32)) -> Body {
        let config = app.world().resource::<GameConfig>().clone();
        let tilemap = app.world().resource::<Tilemap>();
        let center = tilemap.standing_center(
            tile.0,
            tile.1,
            config.tile_size,
            config.agent_height,
        );
        Body::new(center, Vec2::new(config.agent_width, config.agent_height))
    }

    fn chase_app(rows: &[&str]) -> (App, Entity, Entity) {
        let tilemap = Tilemap::from_ascii(rows).expect("test level should parse");
        let target_tile = tilemap.target_spawn.expect("level needs a target");
        let agent_tile = tilemap.agent_spawn.expect("level needs an agent");

        let mut app = App::new();
        app.insert_resource(GameConfig::default())
            .insert_resource(tilemap)
            .add_plugins(PlanningPlugin);

        let target_body = spawn_body(&app, target_tile);
        let agent_body = spawn_body(&app, agent_tile);
        let profile = app.world().resource::<SharedProfile>().clone();
        let target = app.world_mut().spawn((target_body, Target)).id();
        let agent = app
            .world_mut()
            .spawn((
                agent_body,
                PlanningAgent::new(&profile),
                Chaser {
                    target,
                    countdown: 0,
                },
            ))
            .id();
        (app, agent, target)
    }

    fn run_ticks(app: &mut App, n: usize) {
        for _ in 0..n {
            app.world_mut().run_schedule(FixedUpdate);
        }
    }

    #[test]
    fn chaser_walks_to_target() {
        let (mut app, agent, target) =
            chase_app(&["..........", "..........", ".A...P....", "##########"]);
        run_ticks(&mut app, 60);

        let profile = app.world().resource::<SharedProfile>().clone();
        let agent_pos = profile.0.coord2grid(app.world().get::<Body>(agent).unwrap().center);
        let target_pos = profile.0.coord2grid(app.world().get::<Body>(target).unwrap().center);
        assert_eq!(agent_pos, target_pos);
        assert_eq!(app.world().resource::<TickCount>().0, 60);

        let stats = *app.world().resource::<PlannerStats>();
        assert!(stats.searches >= 1);
        assert!(stats.collision_checks > 0);
        assert_eq!(stats.active_plans, 0);
    }

    #[test]
    fn passive_bodies_fall_onto_the_floor() {
        let (mut app, _, target) =
            chase_app(&["....P.....", "..........", ".A........", "##########"]);
        run_ticks(&mut app, 30);
        let body = app.world().get::<Body>(target).unwrap();
        assert_eq!(body.center.y, 40.0);
        assert!(body.grounded);
    }

    #[test]
    fn edited_tilemap_rebuilds_ranges() {
        let (mut app, _, _) =
            chase_app(&["..........", "..........", ".A...P....", "##########"]);
        run_ticks(&mut app, 1);
        let before = app.world().resource::<TileRanges>().obstacle.count(
            crate::tilemap::TileRect {
                x0: 0,
                y0: 0,
                x1: 10,
                y1: 4,
            },
        );
        assert_eq!(before, 10);

        app.world_mut()
            .resource_mut::<Tilemap>()
            .set(3, 0, crate::components::TileType::Floor);
        run_ticks(&mut app, 1);
        let after = app.world().resource::<TileRanges>().obstacle.count(
            crate::tilemap::TileRect {
                x0: 0,
                y0: 0,
                x1: 10,
                y1: 4,
            },
        );
        assert_eq!(after, 11);
    }

    #[test]
    fn missing_tilemap_skips_systems() {
        let mut app = App::new();
        app.add_plugins(PlanningPlugin);
        run_ticks(&mut app, 3);
        assert_eq!(app.world().resource::<TickCount>().0, 0);
    }
}
