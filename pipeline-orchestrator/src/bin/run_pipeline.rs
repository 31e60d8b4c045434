//! LEO handover data-preparation pipeline CLI.
//!
//! Usage:
//!   run-pipeline --tle-root data/tle --config config.json --output out/
//!   run-pipeline --tle-root data/tle --seed 7 --verbose

use anyhow::{Context, Result};
use clap::Parser;
use dynamic_pool_planner::AnnealingParams;
use pipeline_config::Config;
use pipeline_orchestrator::run_pipeline;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "run-pipeline",
    about = "Prepare LEO satellite handover data from a TLE catalogue"
)]
struct Args {
    /// Root of the `<constellation>/tle/*.tle` directory tree
    #[arg(long, default_value = "data/tle")]
    tle_root: PathBuf,

    /// Path to a JSON config file; falls back to built-in defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory to write Stage 5 records and the Stage 6 pool as JSON
    #[arg(short, long, default_value = "out")]
    output: PathBuf,

    /// Seed for the Stage 6 simulated-annealing refinement; defaults to
    /// `AnnealingParams::default()`'s seed when omitted
    #[arg(long)]
    seed: Option<u64>,

    /// Verbose (debug-level) logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = match &args.config {
        Some(path) => Config::from_file(path).with_context(|| format!("loading config from {path:?}"))?,
        None => Config::default(),
    };

    let annealing = match args.seed {
        Some(seed) => AnnealingParams {
            seed,
            ..AnnealingParams::default()
        },
        None => AnnealingParams::default(),
    };

    info!("Running pipeline against {:?}", args.tle_root);
    let report = run_pipeline(&config, &args.tle_root, &annealing)?;

    info!(
        "Completed {} stage steps, lineage tle_data_epoch={} sgp4_base_time={}",
        report.lineage.stages_completed.len(),
        report.lineage.tle_data_epoch,
        report.lineage.sgp4_base_time
    );

    for (constellation, pool) in &report.pools {
        info!(
            "{constellation:?}: pool of {} satellites, min_visible_achieved={}",
            pool.selected.len(),
            pool.coverage_proof.min_visible_achieved
        );
    }

    fs::create_dir_all(&args.output)?;

    let pools_path = args.output.join("dynamic_pools.json");
    let file = File::create(&pools_path)?;
    serde_json::to_writer_pretty(BufWriter::new(file), &report.pools)?;
    info!("Wrote {:?}", pools_path);

    let stage5_path = args.output.join("stage5_records.json");
    let file = File::create(&stage5_path)?;
    serde_json::to_writer_pretty(BufWriter::new(file), &report.stage5)?;
    info!("Wrote {:?}", stage5_path);

    let lineage_path = args.output.join("lineage.json");
    let file = File::create(&lineage_path)?;
    serde_json::to_writer_pretty(BufWriter::new(file), &report.lineage)?;
    info!("Wrote {:?}", lineage_path);

    Ok(())
}
