use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use sim_core::metrics::MetricsCategory;
use sim_core::{CombatState, EncounterRunner, Event, EventLevel, MetricsSnapshot};
use sim_world::{
    build_initial_state, load_content, load_script, validate_script, write_run_info,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "sim_cli", about = "Combat encounter DPS simulator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a cast script against a fresh encounter.
    Run {
        #[arg(long)]
        script: PathBuf,
        /// Roll seed. A random one is drawn when omitted.
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long, default_value = "./content")]
        content_dir: String,
        #[arg(long, default_value_t = 120_000)]
        duration_ms: u64,
        #[arg(long, default_value_t = 10_000)]
        print_every_ms: u64,
        #[arg(long, default_value = "normal", value_parser = ["normal", "debug"])]
        event_level: String,
        /// Sample metrics every N ms of encounter time.
        #[arg(long, default_value_t = 1000)]
        metrics_every_ms: u64,
        /// Disable automatic metrics collection to runs/ directory.
        #[arg(long)]
        no_metrics: bool,
        /// Also write the full event log to the run directory.
        #[arg(long)]
        write_events: bool,
    },
}

struct RunArgs {
    script: PathBuf,
    seed: Option<u64>,
    content_dir: String,
    duration_ms: u64,
    print_every_ms: u64,
    event_level: EventLevel,
    metrics_every_ms: u64,
    no_metrics: bool,
    write_events: bool,
}

// ---------------------------------------------------------------------------
// Run artifacts
// ---------------------------------------------------------------------------

fn generate_run_id(seed: u64) -> String {
    format!("{}_seed{seed}", chrono::Utc::now().format("%Y%m%d_%H%M%S"))
}

fn create_run_dir(run_id: &str) -> Result<PathBuf> {
    let dir = PathBuf::from("runs").join(run_id);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("creating run directory: {}", dir.display()))?;
    Ok(dir)
}

// ---------------------------------------------------------------------------
// Run loop
// ---------------------------------------------------------------------------

fn run(args: &RunArgs) -> Result<()> {
    let content = Arc::new(load_content(&args.content_dir)?);
    let script = load_script(&args.script)?;
    validate_script(&content, &script)?;

    let seed = args.seed.unwrap_or_else(rand::random);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let state = build_initial_state(&content, seed, &mut rng);
    tracing::info!(
        encounter = %state.meta.encounter_id,
        seed,
        script = %script.name,
        entries = script.entries.len(),
        "encounter built"
    );

    let mut metrics_writer: Option<sim_core::MetricsFileWriter> = None;
    let mut run_dir = None;
    if !args.no_metrics {
        let run_id = generate_run_id(seed);
        let dir = create_run_dir(&run_id)?;
        write_run_info(
            &dir,
            &run_id,
            seed,
            &content.content_version,
            args.metrics_every_ms,
            &serde_json::json!({
                "runner": "sim_cli",
                "encounter_id": state.meta.encounter_id,
                "script": args.script.display().to_string(),
                "script_name": script.name,
                "duration_ms": args.duration_ms,
                "print_every_ms": args.print_every_ms,
            }),
        )?;
        let writer = sim_core::MetricsFileWriter::new(dir.clone())
            .with_context(|| format!("opening metrics CSV in {}", dir.display()))?;
        metrics_writer = Some(writer);
        println!("Run directory: {}", dir.display());
        run_dir = Some(dir);
    }

    println!(
        "Starting encounter: script={} duration={}ms seed={seed} units={} abilities={} content_version={}",
        script.name,
        args.duration_ms,
        state.units.len(),
        state.abilities.len(),
        content.content_version,
    );
    println!("{}", "-".repeat(80));

    let mut runner = EncounterRunner::new(
        Arc::clone(&content),
        state,
        &script,
        seed,
        args.duration_ms,
        args.event_level,
    );

    let step = args.metrics_every_ms.max(1);
    let mut next_print = args.print_every_ms.max(1);
    let mut deaths_seen = 0;
    while !runner.is_finished() {
        let next = runner.now().after(step);
        runner.advance_to(next);
        let snapshot = runner.snapshot();

        for event in &runner.encounter.events[deaths_seen..] {
            if let Event::UnitDied { unit } = &event.event {
                println!("*** {unit} DIED at {} ***", event.at);
            }
        }
        deaths_seen = runner.encounter.events.len();

        if snapshot.at_ms >= next_print || runner.is_finished() {
            print_status(&snapshot);
            next_print = snapshot.at_ms + args.print_every_ms.max(1);
        }
        if let Some(ref mut writer) = metrics_writer {
            writer.write_row(&snapshot).context("writing metrics row")?;
        }
    }

    let output = runner.finish();
    println!("{}", "-".repeat(80));
    println!("Done. Final state at {}ms:", output.snapshot.at_ms);
    print_summary(&output.state, &output.snapshot);

    if let Some(ref mut writer) = metrics_writer {
        writer.flush().context("final metrics flush")?;
        println!("Metrics written to runs/ directory.");
    }
    if let (true, Some(dir)) = (args.write_events, &run_dir) {
        let path = dir.join("events.json");
        let file = std::fs::File::create(&path)
            .with_context(|| format!("creating {}", path.display()))?;
        serde_json::to_writer(file, &output.events)
            .with_context(|| format!("writing {}", path.display()))?;
        println!("{} events written to {}", output.events.len(), path.display());
    }

    Ok(())
}

fn print_status(snapshot: &MetricsSnapshot) {
    println!(
        "[t={at:>7}ms]  damage={damage:>10.1}  dps={dps:>7.1}  casts={casts:3}  \
         crits={crits:3}  misses={misses:2}  dodges={dodges:2}  mana+={mana:7.1}  \
         target={health:5.1}%  auras={auras}",
        at = snapshot.at_ms,
        damage = snapshot.total_damage,
        dps = snapshot.dps,
        casts = snapshot.casts,
        crits = snapshot.crits,
        misses = snapshot.misses,
        dodges = snapshot.dodges,
        mana = snapshot.mana_gained,
        health = snapshot.target_health_pct * 100.0,
        auras = snapshot.active_auras,
    );
}

fn print_summary(state: &CombatState, snapshot: &MetricsSnapshot) {
    print_status(snapshot);
    for action in state.metrics.actions() {
        let category = match action.category {
            MetricsCategory::Melee => "melee",
            MetricsCategory::Spell => "spell",
        };
        println!(
            "  {ability:<20} {category:<5}  casts={casts:3}  hits={hits:3}  crits={crits:3}  \
             misses={misses:2}  dodges={dodges:2}  negated={negated:2}  damage={damage:.1}",
            ability = action.ability,
            casts = action.casts,
            hits = action.hits,
            crits = action.crits,
            misses = action.misses,
            dodges = action.dodges,
            negated = action.negated,
            damage = action.total_damage,
        );
    }
    for resource in state.metrics.resources() {
        println!(
            "  {tag:<20} events={events:3}  gained={gain:.1}  actual={actual:.1}  wasted={wasted:.1}",
            tag = resource.tag,
            events = resource.events,
            gain = resource.gain,
            actual = resource.actual,
            wasted = resource.wasted(),
        );
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            script,
            seed,
            content_dir,
            duration_ms,
            print_every_ms,
            event_level,
            metrics_every_ms,
            no_metrics,
            write_events,
        } => {
            let event_level = match event_level.as_str() {
                "debug" => EventLevel::Debug,
                _ => EventLevel::Normal,
            };
            run(&RunArgs {
                script,
                seed,
                content_dir,
                duration_ms,
                print_every_ms,
                event_level,
                metrics_every_ms,
                no_metrics,
                write_events,
            })?;
        }
    }
    Ok(())
}
