use crate::run_result::{self, RunResult, SummaryMetrics};
use anyhow::{Context, Result};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use sim_core::{CastScript, CombatContent, EncounterRunner, EventLevel, MetricsSnapshot};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Everything shared by the seeds of one scenario.
pub struct RunPlan {
    pub content: Arc<CombatContent>,
    pub script: CastScript,
    pub duration_ms: u64,
    pub metrics_every_ms: u64,
    pub scenario_name: String,
    pub scenario_params: serde_json::Value,
}

pub struct SeedResult {
    pub seed: u64,
    pub final_snapshot: MetricsSnapshot,
    #[allow(dead_code)]
    pub wall_time_ms: u64,
    pub run_id: String,
}

fn actions_by_label(runner: &EncounterRunner) -> BTreeMap<String, u64> {
    runner
        .scheduler
        .executed_by_label()
        .iter()
        .map(|(label, count)| ((*label).to_string(), *count))
        .collect()
}

pub fn run_seed(plan: &RunPlan, seed: u64, seed_dir: &Path) -> Result<SeedResult> {
    let run_id = Uuid::new_v4().to_string();
    let start = Instant::now();

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let state = sim_world::build_initial_state(&plan.content, seed, &mut rng);
    let encounter_id = state.meta.encounter_id.clone();

    std::fs::create_dir_all(seed_dir)
        .with_context(|| format!("creating seed directory: {}", seed_dir.display()))?;

    sim_world::write_run_info(
        seed_dir,
        &format!("seed_{seed}"),
        seed,
        &plan.content.content_version,
        plan.metrics_every_ms,
        &serde_json::json!({
            "runner": "sim_bench",
            "encounter_id": encounter_id,
            "script": plan.script.name,
            "duration_ms": plan.duration_ms,
        }),
    )?;

    let mut metrics_writer = sim_core::MetricsFileWriter::new(seed_dir.to_path_buf())
        .with_context(|| format!("opening metrics CSV in {}", seed_dir.display()))?;

    let mut runner = EncounterRunner::new(
        Arc::clone(&plan.content),
        state,
        &plan.script,
        seed,
        plan.duration_ms,
        EventLevel::Normal,
    );
    while !runner.is_finished() {
        let next = runner.now().after(plan.metrics_every_ms);
        runner.advance_to(next);
        metrics_writer
            .write_row(&runner.snapshot())
            .context("writing metrics row")?;
    }
    let actions_by_label = actions_by_label(&runner);
    let output = runner.finish();
    metrics_writer.flush().context("flushing metrics")?;

    #[allow(clippy::cast_possible_truncation)]
    let wall_time_ms = start.elapsed().as_millis() as u64;
    let sim_ms_per_wall_second = if wall_time_ms > 0 {
        plan.duration_ms as f64 / (wall_time_ms as f64 / 1000.0)
    } else {
        0.0
    };

    let final_snapshot = output.snapshot;
    let (stalled, stall_reason) = run_result::detect_stall(&final_snapshot);
    if stalled {
        tracing::warn!(seed, reason = ?stall_reason, "seed stalled");
    }

    let run_result = RunResult {
        run_schema_version: 1,
        run_status: "completed".to_string(),
        run_id: run_id.clone(),
        git_sha: run_result::git_sha(),
        git_dirty: run_result::git_dirty(),
        seed,
        encounter_id,
        scenario_name: plan.scenario_name.clone(),
        scenario_params: plan.scenario_params.clone(),
        duration_ms: plan.duration_ms,
        actions_executed: output.actions_executed,
        actions_by_label,
        wall_time_ms,
        sim_ms_per_wall_second,
        summary_metrics: Some(SummaryMetrics::from_snapshot(&final_snapshot)),
        stalled,
        stall_reason,
        metrics_path: "metrics_000.csv".to_string(),
        error_message: None,
    };

    run_result
        .write_atomic(&seed_dir.join("run_result.json"))
        .context("writing run_result.json")?;

    Ok(SeedResult {
        seed,
        final_snapshot,
        wall_time_ms,
        run_id,
    })
}
