use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod overrides;
mod run_result;
mod runner;
mod scenario;
mod summary;

#[derive(Parser)]
#[command(
    name = "sim_bench",
    about = "Replay one cast script across many seeds and summarize DPS"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario file across multiple seeds.
    Run {
        /// Path to the scenario JSON file.
        #[arg(long)]
        scenario: String,
        /// Output directory (default: runs/).
        #[arg(long, default_value = "runs")]
        output_dir: String,
    },
}

fn run(scenario_path: &str, output_dir: &str) -> Result<()> {
    let scenario = scenario::load_scenario(Path::new(scenario_path))?;
    let seeds = scenario.seeds.expand();

    println!(
        "Loading scenario '{}': {} seeds × {}ms",
        scenario.name,
        seeds.len(),
        scenario.duration_ms
    );

    // Load content and apply overrides.
    let mut content = sim_world::load_content(&scenario.content_dir)?;
    overrides::apply_overrides(&mut content.constants, &scenario.overrides)?;
    sim_world::validate_content(&content);

    let script = sim_world::load_script(Path::new(&scenario.script))?;
    sim_world::validate_script(&content, &script)?;

    let scenario_params = serde_json::json!({
        "duration_ms": scenario.duration_ms,
        "metrics_every_ms": scenario.metrics_every_ms,
        "content_dir": scenario.content_dir,
        "script": scenario.script,
        "overrides": scenario.overrides,
    });
    let plan = runner::RunPlan {
        content: Arc::new(content),
        script,
        duration_ms: scenario.duration_ms,
        metrics_every_ms: scenario.metrics_every_ms,
        scenario_name: scenario.name.clone(),
        scenario_params: scenario_params.clone(),
    };

    // Create timestamped output directory.
    let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
    let run_dir = PathBuf::from(output_dir).join(format!("{}_{}", scenario.name, timestamp));
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("creating output directory: {}", run_dir.display()))?;

    std::fs::copy(scenario_path, run_dir.join("scenario.json")).context("copying scenario file")?;

    println!("Output: {}", run_dir.display());
    println!("Running {} seeds in parallel...", seeds.len());

    let results: Vec<Result<runner::SeedResult>> = seeds
        .par_iter()
        .map(|&seed| runner::run_seed(&plan, seed, &run_dir.join(format!("seed_{seed}"))))
        .collect();

    let mut seed_results = Vec::new();
    for result in results {
        match result {
            Ok(seed_result) => seed_results.push(seed_result),
            Err(err) => {
                tracing::error!(error = %format!("{err:#}"), "seed failed");
                eprintln!("Seed failed: {err:#}");
            }
        }
    }

    if seed_results.is_empty() {
        anyhow::bail!("all seeds failed");
    }

    let snapshot_refs: Vec<(u64, &sim_core::MetricsSnapshot)> = seed_results
        .iter()
        .map(|r| (r.seed, &r.final_snapshot))
        .collect();

    let stats = summary::compute_summary(&snapshot_refs);
    summary::print_summary(&scenario.name, scenario.duration_ms, &stats);

    let summary_path = run_dir.join("summary.json");
    let summary_json = serde_json::to_string_pretty(&stats).context("serializing summary")?;
    std::fs::write(&summary_path, summary_json)
        .with_context(|| format!("writing {}", summary_path.display()))?;

    let batch_id = Uuid::new_v4().to_string();
    let run_ids: Vec<&str> = seed_results.iter().map(|r| r.run_id.as_str()).collect();

    let batch_summary = serde_json::json!({
        "batch_schema_version": 1,
        "batch_id": batch_id,
        "scenario_name": scenario.name,
        "scenario_params": scenario_params,
        "seed_count": seed_results.len(),
        "run_ids": run_ids,
        "stalled_count": stats.stalled_count,
        "aggregated_metrics": summary::build_aggregated_metrics(&stats),
    });

    let batch_path = run_dir.join("batch_summary.json");
    let batch_tmp = batch_path.with_extension("json.tmp");
    let batch_json =
        serde_json::to_string_pretty(&batch_summary).context("serializing batch summary")?;
    let mut batch_file = std::fs::File::create(&batch_tmp)
        .with_context(|| format!("creating {}", batch_tmp.display()))?;
    batch_file
        .write_all(batch_json.as_bytes())
        .context("writing batch summary")?;
    batch_file.sync_all()?;
    std::fs::rename(&batch_tmp, &batch_path).context("renaming batch summary")?;

    println!("Summary written to {}", summary_path.display());
    println!("Batch summary written to {}", batch_path.display());
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            scenario,
            output_dir,
        } => run(&scenario, &output_dir)?,
    }
    Ok(())
}
