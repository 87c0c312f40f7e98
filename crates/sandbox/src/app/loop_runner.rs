use std::fs;
use std::path::Path;
use std::process::ExitCode;
use std::time::Instant;

use agent_engine::{EntityInfo, TickReport, WorldObjects};
use serde::Serialize;
use tracing::{error, info, warn};

use super::bootstrap::AppWiring;
use super::scenario::{self, SandboxScene};

const TARGET_TPS: u32 = 60;
const PROGRESS_LOG_INTERVAL_TICKS: u32 = 60;
const SUMMARY_FILE_NAME: &str = "run_summary.json";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
struct TickTotals {
    ticks: u32,
    entity_updates: u64,
    scripted_updates: u64,
    skipped_dead: u64,
    paths_found: u64,
    paths_failed: u64,
    script_faults: u64,
    reaped: u64,
}

impl TickTotals {
    fn record(&mut self, report: &TickReport, reaped: usize) {
        self.ticks += 1;
        self.entity_updates += u64::from(report.updated);
        self.scripted_updates += u64::from(report.scripted);
        self.skipped_dead += u64::from(report.skipped_dead);
        self.paths_found += u64::from(report.paths_found);
        self.paths_failed += u64::from(report.paths_failed);
        self.script_faults += u64::from(report.script_faults);
        self.reaped += reaped as u64;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct EntitySummary {
    id: u64,
    name: String,
    behavior: &'static str,
    state: &'static str,
    health: f32,
    max_health: f32,
    position: [f32; 3],
}

impl From<EntityInfo> for EntitySummary {
    fn from(info: EntityInfo) -> Self {
        Self {
            id: info.id.0,
            name: info.name,
            behavior: info.behavior.as_str(),
            state: info.state.as_str(),
            health: info.health,
            max_health: info.max_health,
            position: [info.position.x, info.position.y, info.position.z],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct RunSummary {
    simulated_seconds: f64,
    wall_clock_ms: u128,
    time_of_day: f32,
    totals: TickTotals,
    entities: Vec<EntitySummary>,
}

pub(crate) fn run(app: AppWiring) -> ExitCode {
    let mut scene =
        match scenario::build_scene(&app.sim_config, &app.defs, &app.paths.scripts_dir) {
            Ok(scene) => scene,
            Err(err) => {
                error!(error = %err, "scene_build_failed");
                return ExitCode::FAILURE;
            }
        };

    let fixed_dt_seconds = 1.0 / TARGET_TPS as f32;
    info!(
        total_ticks = app.total_ticks,
        target_tps = TARGET_TPS,
        "sim_loop_started"
    );
    let started = Instant::now();
    let mut totals = TickTotals::default();
    for tick in 1..=app.total_ticks {
        let report = scene.manager.update(fixed_dt_seconds);
        scene.manager.world_mut().advance_time(fixed_dt_seconds);
        let reaped = scene.reap_dead();
        totals.record(&report, reaped);

        if tick % PROGRESS_LOG_INTERVAL_TICKS == 0 {
            info!(
                tick,
                alive = scene.manager.entity_count(),
                updated = report.updated,
                paths_found = report.paths_found,
                script_faults = report.script_faults,
                "sim_progress"
            );
        }
    }

    let summary = summarize(&scene, totals, started.elapsed().as_millis());
    info!(
        ticks = summary.totals.ticks,
        simulated_seconds = summary.simulated_seconds,
        wall_clock_ms = summary.wall_clock_ms as u64,
        survivors = summary.entities.len(),
        "sim_loop_finished"
    );
    for entity in &summary.entities {
        info!(
            entity_id = entity.id,
            name = %entity.name,
            state = entity.state,
            health = entity.health,
            "entity_final_state"
        );
    }
    match scene.manager.entity_position(scene.player) {
        Some(position) => info!(x = position.x, y = position.y, z = position.z, "player_final_position"),
        None => warn!("player_did_not_survive"),
    }
    write_summary(&app.paths.cache_dir, &summary);
    ExitCode::SUCCESS
}

fn summarize(scene: &SandboxScene, totals: TickTotals, wall_clock_ms: u128) -> RunSummary {
    let manager = &scene.manager;
    RunSummary {
        simulated_seconds: manager.elapsed_seconds(),
        wall_clock_ms,
        time_of_day: manager.world().time_of_day(),
        totals,
        entities: manager
            .entity_ids()
            .into_iter()
            .filter_map(|id| manager.entity_info(id))
            .map(EntitySummary::from)
            .collect(),
    }
}

fn write_summary(cache_dir: &Path, summary: &RunSummary) {
    let path = cache_dir.join(SUMMARY_FILE_NAME);
    let written = serde_json::to_string_pretty(summary)
        .map_err(|err| err.to_string())
        .and_then(|json| fs::write(&path, json).map_err(|err| err.to_string()));
    match written {
        Ok(()) => info!(path = %path.display(), "run_summary_written"),
        Err(error) => warn!(path = %path.display(), error = %error, "run_summary_write_failed"),
    }
}
