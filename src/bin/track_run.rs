//! Launch the LoRA trainer and track the run in MLflow.
//!
//! Run with: cargo run --bin track_run -- --config finetrack.toml
//!
//! Exits 0 when the run succeeds, otherwise with the trainer's exit code
//! (1 if it had none).

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser;
use finetrack::bridge::{RunBridge, RunStatus};
use finetrack::config::Settings;
use finetrack::tracking::{MemorySink, MlflowSink, TrackingSink};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "track_run", version, about)]
struct Args {
    /// TOML settings file with [tracking] and [training] tables.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// MLflow tracking server URL.
    #[arg(long)]
    tracking_uri: Option<String>,

    /// Experiment name; created if missing.
    #[arg(long)]
    experiment: Option<String>,

    /// Tracking server user.
    #[arg(long, env = "MLFLOW_TRACKING_USERNAME")]
    username: Option<String>,

    /// Tracking server password.
    #[arg(long, env = "MLFLOW_TRACKING_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Bearer token, used when no username is given.
    #[arg(long, env = "MLFLOW_TRACKING_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Model identifier or path passed to the trainer.
    #[arg(long)]
    model: Option<String>,

    /// Directory with train/valid/test JSON-lines files.
    #[arg(long)]
    data: Option<PathBuf>,

    /// Adapter file the trainer writes; uploaded on success.
    #[arg(long)]
    adapter_file: Option<PathBuf>,

    /// Training iterations.
    #[arg(long)]
    iters: Option<u32>,

    /// Batch size.
    #[arg(long)]
    batch_size: Option<u32>,

    /// Trainer working directory.
    #[arg(long)]
    working_dir: Option<PathBuf>,

    /// Kill the trainer after this many seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Display name for the run.
    #[arg(long)]
    run_name: Option<String>,

    /// Track in memory instead of contacting a server.
    #[arg(long)]
    offline: bool,
}

impl Args {
    fn apply(self, settings: &mut Settings) {
        let tracking = &mut settings.tracking;
        if let Some(uri) = self.tracking_uri {
            tracking.tracking_uri = uri;
        }
        if let Some(experiment) = self.experiment {
            tracking.experiment_name = experiment;
        }
        tracking.username = self.username.or(tracking.username.take());
        tracking.password = self.password.or(tracking.password.take());
        tracking.token = self.token.or(tracking.token.take());

        let training = &mut settings.training;
        if let Some(model) = self.model {
            training.model = model;
        }
        if let Some(data) = self.data {
            training.data = data;
        }
        if let Some(adapter_file) = self.adapter_file {
            training.adapter_file = adapter_file;
        }
        if let Some(iters) = self.iters {
            training.iterations = iters;
        }
        if let Some(batch_size) = self.batch_size {
            training.batch_size = batch_size;
        }
        training.working_dir = self.working_dir.or(training.working_dir.take());
        training.timeout_secs = self.timeout_secs.or(training.timeout_secs);
        training.run_name = self.run_name.or(training.run_name.take());
    }
}

fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let offline = args.offline;
    let mut settings =
        Settings::load_or_default(args.config.as_deref()).context("loading settings")?;
    args.apply(&mut settings);
    settings.validate()?;

    let sink: Box<dyn TrackingSink> = if offline {
        info!("tracking offline, nothing will be sent to a server");
        Box::new(MemorySink::new())
    } else {
        info!(uri = %settings.tracking.tracking_uri, "tracking to MLflow");
        Box::new(MlflowSink::new(&settings.tracking).context("building MLflow client")?)
    };

    let mut bridge = RunBridge::new(sink).with_echo(true);
    let report = bridge.run(&settings.training).context("training run")?;

    println!("{}", report.summary());
    if report.status == RunStatus::Succeeded {
        Ok(ExitCode::SUCCESS)
    } else {
        let code = report
            .exit
            .code()
            .and_then(|code| u8::try_from(code).ok())
            .filter(|&code| code != 0)
            .unwrap_or(1);
        Ok(ExitCode::from(code))
    }
}
