//! Configuration
//!
//! Settings are read from an optional TOML file and then overridden by
//! command-line flags. Nothing in the library reads the process
//! environment; credentials reach the tracking client only through
//! [`TrackingConfig`].
//!
//! ```toml
//! [tracking]
//! tracking_uri = "https://dagshub.com/owner/repo.mlflow"
//! experiment_name = "politeness-bot-experiment"
//!
//! [training]
//! model = "models/tinyllama-cpu.gguf"
//! iterations = 10
//!
//! [split]
//! seed = 42
//! ```

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::bridge::TrainingConfig;
use crate::split::SplitOptions;
use crate::{Error, Result};

/// All settings, one table per tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Tracking server connection
    pub tracking: TrackingConfig,
    /// Trainer invocation and run parameters
    pub training: TrainingConfig,
    /// Dataset split
    pub split: SplitOptions,
}

impl Settings {
    /// Parse settings from TOML text. Missing tables and keys take defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] on malformed TOML or unknown keys.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load settings from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read and
    /// [`Error::Config`] if it cannot be parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Load settings from `path` if given, defaults otherwise.
    ///
    /// # Errors
    ///
    /// See [`Settings::load`].
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        path.map_or_else(|| Ok(Self::default()), Self::load)
    }

    /// Check every table for inconsistent values.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<()> {
        self.tracking.validate()?;
        self.training.validate()?;
        self.split.validate()
    }
}

/// Connection settings for the MLflow tracking server.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrackingConfig {
    /// Base URL of the tracking server (no `/api/...` suffix)
    pub tracking_uri: String,
    /// Experiment runs are created in; created if missing
    pub experiment_name: String,
    /// Basic-auth user
    pub username: Option<String>,
    /// Basic-auth password
    pub password: Option<String>,
    /// Bearer token, used when no username is set
    pub token: Option<String>,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            tracking_uri: "http://127.0.0.1:5000".to_string(),
            experiment_name: "politeness-bot-experiment".to_string(),
            username: None,
            password: None,
            token: None,
            timeout_secs: 30,
        }
    }
}

impl fmt::Debug for TrackingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackingConfig")
            .field("tracking_uri", &self.tracking_uri)
            .field("experiment_name", &self.experiment_name)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl TrackingConfig {
    /// Check the connection settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a non-HTTP URI, an empty experiment
    /// name, a zero timeout or a password without a username.
    pub fn validate(&self) -> Result<()> {
        if !(self.tracking_uri.starts_with("http://") || self.tracking_uri.starts_with("https://"))
        {
            return Err(Error::Config(format!(
                "tracking_uri must be an http(s) URL, got '{}'",
                self.tracking_uri
            )));
        }
        if self.experiment_name.trim().is_empty() {
            return Err(Error::Config("experiment_name must not be empty".into()));
        }
        if self.timeout_secs == 0 {
            return Err(Error::Config("timeout_secs must be positive".into()));
        }
        if self.password.is_some() && self.username.is_none() {
            return Err(Error::Config("password given without username".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_is_default() {
        let settings = Settings::from_toml_str("").unwrap();
        assert_eq!(settings, Settings::default());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_tables() {
        let settings = Settings::from_toml_str(
            r#"
            [tracking]
            tracking_uri = "https://dagshub.com/owner/repo.mlflow"
            username = "owner"
            password = "secret"

            [training]
            iterations = 200

            [split]
            seed = 7
            "#,
        )
        .unwrap();

        assert_eq!(
            settings.tracking.tracking_uri,
            "https://dagshub.com/owner/repo.mlflow"
        );
        assert_eq!(
            settings.tracking.experiment_name,
            TrackingConfig::default().experiment_name
        );
        assert_eq!(settings.training.iterations, 200);
        assert_eq!(settings.training.batch_size, 1);
        assert_eq!(settings.split.seed, 7);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = Settings::from_toml_str("[tracking]\nurl = \"x\"").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = TrackingConfig {
            username: Some("owner".into()),
            password: Some("hunter2".into()),
            token: Some("tok".into()),
            ..TrackingConfig::default()
        };
        let shown = format!("{config:?}");
        assert!(shown.contains("owner"));
        assert!(!shown.contains("hunter2"));
        assert!(!shown.contains("tok\""));
        assert!(shown.contains("<redacted>"));
    }

    #[test]
    fn test_tracking_validation() {
        let bad_uri = TrackingConfig {
            tracking_uri: "ftp://host".into(),
            ..TrackingConfig::default()
        };
        assert!(bad_uri.validate().is_err());

        let orphan_password = TrackingConfig {
            password: Some("x".into()),
            ..TrackingConfig::default()
        };
        assert!(orphan_password.validate().is_err());

        let zero_timeout = TrackingConfig {
            timeout_secs: 0,
            ..TrackingConfig::default()
        };
        assert!(zero_timeout.validate().is_err());
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = Settings::load("/no/such/finetrack.toml").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert!(Settings::load_or_default(None).is_ok());
    }

    #[test]
    fn test_sample_settings_match_defaults() {
        let settings = Settings::from_toml_str(include_str!("../finetrack.toml")).unwrap();
        assert_eq!(settings, Settings::default());
        settings.validate().unwrap();
    }
}
