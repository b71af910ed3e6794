//! Run Bridge: trainer output to tracked metrics
//!
//! ```text
//! start_run ──> execute ──────────────────────> finish_run
//!   │             │  line ──> parse_line ──> sink.log_metric
//!   │             │  (one consumer, sequential sink calls)
//!   params        exit code                      status, artifact
//! ```
//!
//! Metric writes are best effort: a rejected sample is logged and counted
//! but never stops the run. Failures while opening or finalising the run
//! are returned to the caller.

mod command;
mod parse;
mod process;
mod run;

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{error, info, warn};

pub use command::{TrainingCommand, TrainingConfig};
pub use parse::{parse_line, MetricSample, TRAIN_LOSS, VAL_LOSS};
pub use process::{stream_lines, ExecOptions, ExitStatus};
pub use run::{RunHandle, RunReport, RunStats};

pub use crate::tracking::RunStatus;
use crate::tracking::{RunRecord, TrackingSink};
use crate::{Error, Result};

/// Supervises training runs and reports them to a [`TrackingSink`].
#[derive(Debug)]
pub struct RunBridge<S> {
    sink: S,
    exec: ExecOptions,
    echo: bool,
}

impl<S: TrackingSink> RunBridge<S> {
    /// Create a bridge reporting to `sink`. Output echo is off.
    #[must_use]
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            exec: ExecOptions::default(),
            echo: false,
        }
    }

    /// Print every trainer line to stdout as it arrives.
    #[must_use]
    pub const fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Default process options for [`RunBridge::execute`].
    #[must_use]
    pub const fn with_exec_options(mut self, exec: ExecOptions) -> Self {
        self.exec = exec;
        self
    }

    /// The sink runs are reported to.
    #[must_use]
    pub const fn sink(&self) -> &S {
        &self.sink
    }

    /// Consume the bridge, returning its sink.
    #[must_use]
    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Open a run in the sink, record `config`'s parameters and move the run
    /// to Running.
    ///
    /// # Errors
    ///
    /// Returns the sink's error if the run cannot be created or a parameter
    /// cannot be recorded. A run that was created but could not be opened
    /// is marked Failed in the sink (best effort) before the error is
    /// returned.
    pub fn start_run(&mut self, config: &TrainingConfig) -> Result<RunHandle> {
        let mut record = self.sink.create_run(config.run_name.as_deref())?;
        if let Err(e) = self.open_run(&mut record, config) {
            error!(run_id = record.run_id(), error = %e, "could not open run");
            if let Err(abort) = self.sink.set_status(record.run_id(), RunStatus::Failed) {
                warn!(run_id = record.run_id(), error = %abort, "could not mark run failed");
            }
            return Err(e);
        }
        info!(
            run_id = record.run_id(),
            experiment_id = record.experiment_id(),
            "started run"
        );

        let artifact = config.resolved_adapter(&working_dir(config));
        Ok(RunHandle::new(
            record,
            artifact,
            config.artifact_path.clone(),
        ))
    }

    fn open_run(&mut self, record: &mut RunRecord, config: &TrainingConfig) -> Result<()> {
        for (key, value) in config.params() {
            self.sink.log_param(record.run_id(), key, &value)?;
        }
        self.sink.set_status(record.run_id(), RunStatus::Running)?;
        record.start()
    }

    /// Run `command` to completion with the bridge's default options,
    /// forwarding parsed metrics to the sink.
    ///
    /// # Errors
    ///
    /// See [`RunBridge::execute_with`].
    pub fn execute(
        &mut self,
        handle: &mut RunHandle,
        command: &TrainingCommand,
        working_dir: &Path,
    ) -> Result<ExitStatus> {
        let options = self.exec;
        self.execute_with(handle, command, working_dir, &options)
    }

    /// Run `command` to completion, forwarding parsed metrics to the sink.
    ///
    /// Blocks on each line of output; returns once the process has exited.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the run is not Running, and the
    /// process errors of [`stream_lines`].
    pub fn execute_with(
        &mut self,
        handle: &mut RunHandle,
        command: &TrainingCommand,
        working_dir: &Path,
        options: &ExecOptions,
    ) -> Result<ExitStatus> {
        if handle.status() != RunStatus::Running {
            return Err(Error::InvalidInput(format!(
                "run {} is {:?}, expected Running",
                handle.run_id(),
                handle.status()
            )));
        }
        info!(run_id = handle.run_id(), command = %command.display(), "launching trainer");
        stream_lines(command, working_dir, options, |line| {
            self.observe_line(handle, line);
        })
    }

    /// Handle one line of trainer output: echo it, parse it and log any
    /// metric samples at the run's current step.
    pub fn observe_line(&mut self, handle: &mut RunHandle, line: &str) {
        if self.echo {
            println!("{line}");
        }
        handle.stats.lines += 1;

        let (step, samples) = parse_line(line, handle.step);
        handle.step = step;

        for sample in samples {
            handle.stats.samples += 1;
            if let Err(e) =
                self.sink
                    .log_metric(handle.run_id(), sample.name, sample.value, sample.step)
            {
                handle.stats.dropped += 1;
                warn!(
                    run_id = handle.run_id(),
                    metric = sample.name,
                    step = sample.step,
                    error = %e,
                    "dropping metric sample"
                );
            }
        }
    }

    /// Record the run's terminal state. On exit code 0 the run is marked
    /// Succeeded and the artifact is persisted; otherwise it is marked
    /// Failed and no artifact is attempted.
    ///
    /// The status is recorded first, so an artifact failure leaves it
    /// unchanged.
    ///
    /// # Errors
    ///
    /// Returns the sink's error if the status or artifact cannot be
    /// recorded, and [`Error::InvalidTransition`] if the run is not
    /// Running.
    pub fn finish_run(&mut self, mut handle: RunHandle, exit: ExitStatus) -> Result<RunReport> {
        let status = if exit.success() {
            RunStatus::Succeeded
        } else {
            RunStatus::Failed
        };
        handle.record.complete(status)?;
        self.sink.set_status(handle.run_id(), status)?;

        let artifact_logged = if status == RunStatus::Succeeded {
            self.sink
                .log_artifact(handle.run_id(), &handle.artifact, &handle.artifact_path)?;
            info!(
                run_id = handle.run_id(),
                artifact = %handle.artifact.display(),
                "run succeeded"
            );
            true
        } else {
            warn!(
                run_id = handle.run_id(),
                code = ?exit.code(),
                timed_out = exit.timed_out(),
                "run failed"
            );
            false
        };

        Ok(RunReport {
            run_id: handle.run_id().to_string(),
            status,
            exit,
            stats: handle.stats,
            artifact_logged,
        })
    }

    /// Drive a whole run for `config`: start, execute its command, finish.
    ///
    /// If the trainer cannot be launched the run is still marked Failed
    /// before the launch error is returned.
    ///
    /// # Errors
    ///
    /// Returns launch errors and the errors of [`RunBridge::start_run`] and
    /// [`RunBridge::finish_run`].
    pub fn run(&mut self, config: &TrainingConfig) -> Result<RunReport> {
        let mut handle = self.start_run(config)?;
        let dir = working_dir(config);
        let options = config
            .timeout_secs
            .map_or(self.exec, |secs| {
                ExecOptions::with_timeout(Duration::from_secs(secs))
            });

        match self.execute_with(&mut handle, &config.command(), &dir, &options) {
            Ok(exit) => self.finish_run(handle, exit),
            Err(e) => {
                error!(run_id = handle.run_id(), error = %e, "could not run trainer");
                if let Err(finish) = self.finish_run(handle, ExitStatus::no_code()) {
                    warn!(error = %finish, "could not mark run failed");
                }
                Err(e)
            }
        }
    }
}

fn working_dir(config: &TrainingConfig) -> PathBuf {
    config
        .working_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::MemorySink;

    #[test]
    fn test_start_run_records_params() {
        let mut bridge = RunBridge::new(MemorySink::new());
        let config = TrainingConfig {
            run_name: Some("lora-smoke".into()),
            ..TrainingConfig::default()
        };
        let handle = bridge.start_run(&config).unwrap();

        assert_eq!(handle.status(), RunStatus::Running);
        let sink = bridge.sink();
        assert_eq!(sink.run_name(handle.run_id()), Some("lora-smoke"));
        assert_eq!(sink.get_param(handle.run_id(), "iterations"), Some("10"));
        assert_eq!(sink.get_param(handle.run_id(), "device"), Some("cpu"));
        assert_eq!(
            sink.params_for_run(handle.run_id()).len(),
            config.params().len()
        );
        assert_eq!(
            sink.get_run(handle.run_id()).unwrap().status(),
            RunStatus::Running
        );
    }

    #[test]
    fn test_step_is_sticky_across_lines() {
        let mut bridge = RunBridge::new(MemorySink::new());
        let mut handle = bridge.start_run(&TrainingConfig::default()).unwrap();

        for line in [
            "Loading pretrained model",
            "Iter 1: Val loss 2.900, Val took 1.2s",
            "Iter 10: Train loss 2.345, It/sec 0.51",
            "Val loss 2.1",
        ] {
            bridge.observe_line(&mut handle, line);
        }

        let sink = bridge.sink();
        let val = sink.get_metrics_for_run(handle.run_id(), VAL_LOSS);
        let train = sink.get_metrics_for_run(handle.run_id(), TRAIN_LOSS);
        assert_eq!(val.iter().map(|m| m.step()).collect::<Vec<_>>(), vec![1, 10]);
        assert_eq!(train.len(), 1);
        assert_eq!(train[0].step(), 10);
        assert_eq!(handle.step(), 10);
        assert_eq!(handle.stats().lines, 4);
        assert_eq!(handle.stats().samples, 3);
    }

    #[test]
    fn test_failed_exit_skips_artifact() {
        let mut bridge = RunBridge::new(MemorySink::new());
        let handle = bridge.start_run(&TrainingConfig::default()).unwrap();
        let run_id = handle.run_id().to_string();

        let report = bridge.finish_run(handle, ExitStatus::from_code(1)).unwrap();

        assert_eq!(report.status, RunStatus::Failed);
        assert!(!report.artifact_logged);
        assert!(bridge.sink().artifacts_for_run(&run_id).is_empty());
        assert_eq!(
            bridge.sink().get_run(&run_id).unwrap().status(),
            RunStatus::Failed
        );
    }

    #[test]
    fn test_missing_artifact_keeps_succeeded_status() {
        let mut bridge = RunBridge::new(MemorySink::new());
        let config = TrainingConfig {
            adapter_file: PathBuf::from("/no/such/adapters.npz"),
            ..TrainingConfig::default()
        };
        let handle = bridge.start_run(&config).unwrap();
        let run_id = handle.run_id().to_string();

        let err = bridge
            .finish_run(handle, ExitStatus::from_code(0))
            .unwrap_err();

        assert!(matches!(err, Error::Io(_)));
        assert_eq!(
            bridge.sink().get_run(&run_id).unwrap().status(),
            RunStatus::Succeeded
        );
    }

    #[test]
    fn test_execute_requires_running() {
        let mut bridge = RunBridge::new(MemorySink::new());
        let mut handle = bridge.start_run(&TrainingConfig::default()).unwrap();
        handle.record.complete(RunStatus::Failed).unwrap();

        let command = TrainingCommand::new("true", vec![]);
        let err = bridge
            .execute(&mut handle, &command, Path::new("."))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
