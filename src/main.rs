mod ai;
mod components;
mod debug;
mod envelope;
mod physics_core;
mod plan_map;
mod plan_runner;
mod planning;
mod tilemap;

use std::time::Duration;

use bevy::app::ScheduleRunnerPlugin;
use bevy::log::LogPlugin;
use bevy::prelude::*;

use ai::{PlannerStats, PlanningAgent, PlanningPlugin, TickCount};
use components::{Body, Chaser, GameConfig, Target};
use envelope::SharedProfile;
use tilemap::Tilemap;

const EMBEDDED_LEVEL: &str = include_str!(concat!(env!("OUT_DIR"), "/arcplan_embedded_level.txt"));

#[derive(Resource, Clone, Copy)]
struct DemoSettings {
    ticks: u64,
    dump_plan: bool,
}

#[derive(Resource)]
struct DemoEntities {
    agent: Entity,
    target: Entity,
}

fn load_config() -> GameConfig {
    let path = std::env::var("ARCPLAN_CONFIG")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "arcplan.json".to_string());
    match std::fs::read_to_string(&path) {
        Ok(contents) => match serde_json::from_str::<GameConfig>(&contents) {
            Ok(cfg) => {
                println!("[Arcplan] Loaded config from {}", path);
                cfg
            }
            Err(e) => {
                eprintln!("[Arcplan] Failed to parse {}: {}", path, e);
                GameConfig::default()
            }
        },
        Err(_) => GameConfig::default(),
    }
}

fn load_level() -> Result<Tilemap, String> {
    if let Some(path) = std::env::var("ARCPLAN_LEVEL").ok().filter(|s| !s.is_empty()) {
        let text = std::fs::read_to_string(&path).map_err(|e| format!("{path}: {e}"))?;
        println!("[Arcplan] Loaded level from {}", path);
        return Tilemap::parse(&text);
    }
    if !EMBEDDED_LEVEL.trim().is_empty() {
        println!("[Arcplan] Using embedded level");
        return Tilemap::parse(EMBEDDED_LEVEL);
    }
    Tilemap::demo_level()
}

fn parse_args(args: &[String]) -> Result<DemoSettings, String> {
    let mut settings = DemoSettings {
        ticks: 600,
        dump_plan: false,
    };
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--ticks" => {
                let value = iter.next().ok_or("--ticks needs a value")?;
                settings.ticks = value
                    .parse()
                    .map_err(|e| format!("invalid --ticks {value}: {e}"))?;
            }
            "--dump-plan" => settings.dump_plan = true,
            other => return Err(format!("unknown argument {other}")),
        }
    }
    Ok(settings)
}

fn spawn_demo(
    mut commands: Commands,
    config: Res<GameConfig>,
    tilemap: Res<Tilemap>,
    profile: Res<SharedProfile>,
) {
    let size = Vec2::new(config.agent_width, config.agent_height);
    let place = |(tx, ty): (i32, i32)| {
        Body::new(
            tilemap.standing_center(tx, ty, config.tile_size, config.agent_height),
            size,
        )
    };
    let target_tile = tilemap.target_spawn.unwrap_or((tilemap.width as i32 - 2, 0));
    let agent_tile = tilemap.agent_spawn.unwrap_or((1, 0));

    let target = commands.spawn((place(target_tile), Target)).id();
    let agent = commands
        .spawn((
            place(agent_tile),
            PlanningAgent::new(&profile),
            Chaser {
                target,
                countdown: 0,
            },
        ))
        .id();
    info!("agent at tile {agent_tile:?} chasing target at tile {target_tile:?}");
    commands.insert_resource(DemoEntities { agent, target });
}

fn finish_demo(
    settings: Res<DemoSettings>,
    ticks: Res<TickCount>,
    stats: Res<PlannerStats>,
    entities: Res<DemoEntities>,
    profile: Res<SharedProfile>,
    bodies: Query<&Body>,
    agents: Query<&PlanningAgent>,
    mut exit: EventWriter<AppExit>,
) {
    if ticks.0 < settings.ticks {
        return;
    }
    let (Ok(agent), Ok(target)) = (bodies.get(entities.agent), bodies.get(entities.target)) else {
        exit.send(AppExit::error());
        return;
    };
    let agent_pos = profile.0.coord2grid(agent.center);
    let target_pos = profile.0.coord2grid(target.center);
    println!(
        "[Arcplan] {} ticks: agent at {:?}, target at {:?}, {} searches, {} expansions, {} collision checks",
        ticks.0, agent_pos, target_pos, stats.searches, stats.expansions, stats.collision_checks
    );
    println!(
        "[Arcplan] {}",
        if agent_pos == target_pos {
            "target reached"
        } else {
            "target not reached"
        }
    );

    if settings.dump_plan {
        match agents.get(entities.agent).ok().and_then(|a| a.0.plan()) {
            Some(plan) => match plan.dump_json() {
                Ok(json) => println!("{json}"),
                Err(e) => eprintln!("[Arcplan] Failed to dump plan: {e}"),
            },
            None => println!("[Arcplan] No active plan to dump"),
        }
    }
    exit.send(AppExit::Success);
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let settings = match parse_args(&args) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("[Arcplan] {e}");
            eprintln!("usage: arcplan [--ticks N] [--dump-plan]");
            std::process::exit(2);
        }
    };
    let config = load_config();
    let tilemap = match load_level() {
        Ok(t) => t,
        Err(e) => {
            eprintln!("[Arcplan] Invalid level: {e}");
            std::process::exit(2);
        }
    };
    println!(
        "[Arcplan] Level {}x{}, running {} ticks",
        tilemap.width, tilemap.height, settings.ticks
    );

    App::new()
        .add_plugins(
            MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(Duration::from_secs_f64(
                1.0 / 60.0,
            ))),
        )
        .add_plugins(LogPlugin::default())
        .insert_resource(Time::<Fixed>::from_hz(60.0))
        .insert_resource(config)
        .insert_resource(tilemap)
        .insert_resource(settings)
        .add_plugins(PlanningPlugin)
        .add_systems(Startup, spawn_demo)
        .add_systems(FixedPostUpdate, finish_demo)
        .run();
}
