//! Split a JSON-lines corpus into train / valid / test files.
//!
//! Run with: cargo run --bin split_dataset -- -i data/raw_data.jsonl -o data/mlx_format

use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;
use finetrack::config::Settings;
use finetrack::split::{self, MIN_RECOMMENDED_RECORDS};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "split_dataset", version, about)]
struct Args {
    /// Input JSON-lines file, one object per line.
    #[arg(short, long, default_value = "data/raw_data.jsonl")]
    input: PathBuf,

    /// Directory for train.jsonl, valid.jsonl and test.jsonl.
    #[arg(short, long, default_value = "data/mlx_format")]
    output_dir: PathBuf,

    /// TOML settings file; its [split] table supplies defaults.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// RNG seed.
    #[arg(short, long)]
    seed: Option<u64>,

    /// Share of records held out for testing (validation gets as many).
    #[arg(short = 't', long)]
    test_fraction: Option<f64>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut options = Settings::load_or_default(args.config.as_deref())
        .context("loading settings")?
        .split;
    if let Some(seed) = args.seed {
        options.seed = seed;
    }
    if let Some(fraction) = args.test_fraction {
        options.test_fraction = fraction;
    }
    options.validate()?;

    info!(input = %args.input.display(), "loading records");
    let records = split::read_jsonl(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    info!(records = records.len(), "loaded records");
    if records.len() < MIN_RECOMMENDED_RECORDS {
        warn!(
            records = records.len(),
            minimum = MIN_RECOMMENDED_RECORDS,
            "dataset is too small for three non-empty splits"
        );
    }

    let split = split::split_dataset(records, &options)?;
    let summary = split::write_splits(&args.output_dir, &split)
        .with_context(|| format!("writing splits to {}", args.output_dir.display()))?;

    println!("{}: {} samples", split::TRAIN_FILE, summary.train);
    println!("{}: {} samples", split::VALID_FILE, summary.validation);
    println!("{}: {} samples", split::TEST_FILE, summary.test);
    println!("Files saved to: {}", summary.output_dir.display());
    Ok(())
}
