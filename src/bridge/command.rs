//! Trainer invocation and run parameters

use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Static parameters of one training run.
///
/// Every field that describes the run is recorded verbatim as a run
/// parameter by [`crate::bridge::RunBridge::start_run`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainingConfig {
    /// Interpreter or executable that runs the trainer
    pub program: String,
    /// Trainer script passed as the first argument (omitted when empty)
    pub script: String,
    /// Model identifier or path
    pub model: String,
    /// Descriptive model label recorded as `model_type`
    pub model_type: String,
    /// Directory holding `train.jsonl` / `valid.jsonl` / `test.jsonl`
    pub data: PathBuf,
    /// Where the data came from, recorded as `data_source`
    pub data_source: String,
    /// Output adapter file; uploaded as the run artifact on success
    pub adapter_file: PathBuf,
    /// Artifact directory the adapter is stored under
    pub artifact_path: String,
    /// Number of training iterations
    pub iterations: u32,
    /// Batch size
    pub batch_size: u32,
    /// Device label, e.g. `cpu` or `gpu`
    pub device: String,
    /// Pass `--device <device>` to the trainer
    pub pass_device_flag: bool,
    /// Display name for the tracked run
    pub run_name: Option<String>,
    /// Working directory for the trainer (current directory when unset)
    pub working_dir: Option<PathBuf>,
    /// Kill the trainer after this many seconds
    pub timeout_secs: Option<u64>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            program: "python".to_string(),
            script: "mlx-examples/lora/lora.py".to_string(),
            model: "models/tinyllama-cpu.gguf".to_string(),
            model_type: "CPU_GGUF_TinyLlama".to_string(),
            data: PathBuf::from("data/mlx_format"),
            data_source: "DVC_Drive".to_string(),
            adapter_file: PathBuf::from("adapters/politeness_adapters.npz"),
            artifact_path: "model_adapters".to_string(),
            iterations: 10,
            batch_size: 1,
            device: "cpu".to_string(),
            pass_device_flag: false,
            run_name: None,
            working_dir: None,
            timeout_secs: None,
        }
    }
}

impl TrainingConfig {
    /// Check the trainer settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an empty program, zero iterations or a
    /// zero batch size.
    pub fn validate(&self) -> Result<()> {
        if self.program.trim().is_empty() {
            return Err(Error::Config("training.program must not be empty".into()));
        }
        if self.iterations == 0 {
            return Err(Error::Config("training.iterations must be positive".into()));
        }
        if self.batch_size == 0 {
            return Err(Error::Config("training.batch_size must be positive".into()));
        }
        if self.timeout_secs == Some(0) {
            return Err(Error::Config("training.timeout_secs must be positive".into()));
        }
        Ok(())
    }

    /// Run parameters in the order they are logged.
    #[must_use]
    pub fn params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("model_type", self.model_type.clone()),
            ("model", self.model.clone()),
            ("iterations", self.iterations.to_string()),
            ("batch_size", self.batch_size.to_string()),
            ("data_source", self.data_source.clone()),
            ("data", self.data.display().to_string()),
            ("adapter_file", self.adapter_file.display().to_string()),
            ("device", self.device.clone()),
        ]
    }

    /// Build the trainer command line.
    #[must_use]
    pub fn command(&self) -> TrainingCommand {
        let mut args = Vec::new();
        if !self.script.is_empty() {
            args.push(self.script.clone());
        }
        args.extend([
            "--model".to_string(),
            self.model.clone(),
            "--train".to_string(),
            "--data".to_string(),
            self.data.display().to_string(),
            "--adapter-file".to_string(),
            self.adapter_file.display().to_string(),
            "--iters".to_string(),
            self.iterations.to_string(),
            "--batch-size".to_string(),
            self.batch_size.to_string(),
        ]);
        if self.pass_device_flag {
            args.extend(["--device".to_string(), self.device.clone()]);
        }
        TrainingCommand::new(self.program.clone(), args)
    }

    /// Adapter location resolved against the trainer's working directory.
    #[must_use]
    pub fn resolved_adapter(&self, working_dir: &Path) -> PathBuf {
        working_dir.join(&self.adapter_file)
    }
}

/// A program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingCommand {
    /// Executable
    pub program: String,
    /// Arguments, not shell-interpreted
    pub args: Vec<String>,
}

impl TrainingCommand {
    /// Create a command.
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Convert into a [`std::process::Command`] running in `working_dir`.
    #[must_use]
    pub fn to_command(&self, working_dir: &Path) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args).current_dir(working_dir);
        command
    }

    /// Shell-like rendering for logs.
    #[must_use]
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command_line() {
        let command = TrainingConfig::default().command();
        assert_eq!(command.program, "python");
        assert_eq!(
            command.args,
            vec![
                "mlx-examples/lora/lora.py",
                "--model",
                "models/tinyllama-cpu.gguf",
                "--train",
                "--data",
                "data/mlx_format",
                "--adapter-file",
                "adapters/politeness_adapters.npz",
                "--iters",
                "10",
                "--batch-size",
                "1",
            ]
        );
    }

    #[test]
    fn test_device_flag_is_opt_in() {
        let config = TrainingConfig {
            device: "gpu".into(),
            pass_device_flag: true,
            ..TrainingConfig::default()
        };
        let args = config.command().args;
        assert_eq!(&args[args.len() - 2..], ["--device", "gpu"]);
    }

    #[test]
    fn test_empty_script_omitted() {
        let config = TrainingConfig {
            program: "mlx_lm.lora".into(),
            script: String::new(),
            ..TrainingConfig::default()
        };
        let command = config.command();
        assert_eq!(command.args[0], "--model");
        assert!(command.display().starts_with("mlx_lm.lora --model"));
    }

    #[test]
    fn test_params_recorded_verbatim() {
        let config = TrainingConfig {
            iterations: 250,
            device: "CPU".into(),
            ..TrainingConfig::default()
        };
        let params = config.params();
        assert!(params.contains(&("iterations", "250".to_string())));
        assert!(params.contains(&("device", "CPU".to_string())));
        assert!(params.contains(&("model", "models/tinyllama-cpu.gguf".to_string())));
        assert!(params.contains(&("data", "data/mlx_format".to_string())));
    }

    #[test]
    fn test_validation() {
        assert!(TrainingConfig::default().validate().is_ok());
        let zero_iters = TrainingConfig {
            iterations: 0,
            ..TrainingConfig::default()
        };
        assert!(zero_iters.validate().is_err());
        let zero_timeout = TrainingConfig {
            timeout_secs: Some(0),
            ..TrainingConfig::default()
        };
        assert!(zero_timeout.validate().is_err());
    }
}
