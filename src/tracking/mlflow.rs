//! MLflow Sink - REST client for an MLflow tracking server
//!
//! Uses the 2.0 REST API. Artifacts are uploaded to the run's own
//! `artifact_uri`: `mlflow-artifacts:` roots go through the tracking
//! server's artifact proxy (`--serve-artifacts`, the default since MLflow
//! 2.0) and `http(s)` roots are written to directly. Other stores (`s3://`,
//! `file://`) are not reachable through the REST API and are rejected.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{RunRecord, RunStatus, TrackingSink};
use crate::config::TrackingConfig;
use crate::{Error, Result};

/// Tracking sink backed by an MLflow server.
///
/// The experiment is resolved by name on first use and created if it does
/// not exist yet.
pub struct MlflowSink {
    client: Client,
    base_url: String,
    experiment_name: String,
    experiment_id: Option<String>,
    artifact_roots: HashMap<String, String>,
    username: Option<String>,
    password: Option<String>,
    token: Option<String>,
}

#[derive(Serialize)]
struct CreateExperiment<'a> {
    name: &'a str,
}

#[derive(Deserialize)]
struct CreateExperimentResponse {
    experiment_id: String,
}

#[derive(Deserialize)]
struct GetExperimentResponse {
    experiment: Experiment,
}

#[derive(Deserialize)]
struct Experiment {
    experiment_id: String,
}

#[derive(Serialize)]
struct CreateRun<'a> {
    experiment_id: &'a str,
    start_time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    run_name: Option<&'a str>,
}

#[derive(Deserialize)]
struct RunResponse {
    run: Run,
}

#[derive(Deserialize)]
struct Run {
    info: RunInfo,
}

#[derive(Deserialize)]
struct RunInfo {
    run_id: String,
    experiment_id: String,
    #[serde(default)]
    artifact_uri: Option<String>,
}

#[derive(Serialize)]
struct LogParam<'a> {
    run_id: &'a str,
    key: &'a str,
    value: &'a str,
}

#[derive(Serialize)]
struct LogMetric<'a> {
    run_id: &'a str,
    key: &'a str,
    value: f64,
    timestamp: i64,
    step: u64,
}

#[derive(Serialize)]
struct UpdateRun<'a> {
    run_id: &'a str,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_time: Option<i64>,
}

/// MLflow's name for a run status.
#[must_use]
pub const fn mlflow_status(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Created => "SCHEDULED",
        RunStatus::Running => "RUNNING",
        RunStatus::Succeeded => "FINISHED",
        RunStatus::Failed => "FAILED",
    }
}

impl MlflowSink {
    /// Build a client from explicit connection settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the settings are invalid and
    /// [`Error::Http`] if the HTTP client cannot be built.
    pub fn new(config: &TrackingConfig) -> Result<Self> {
        config.validate()?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.tracking_uri.trim_end_matches('/').to_string(),
            experiment_name: config.experiment_name.clone(),
            experiment_id: None,
            artifact_roots: HashMap::new(),
            username: config.username.clone(),
            password: config.password.clone(),
            token: config.token.clone(),
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/2.0/mlflow/{path}", self.base_url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match (&self.username, &self.token) {
            (Some(user), _) => request.basic_auth(user, self.password.as_deref()),
            (None, Some(token)) => request.bearer_auth(token),
            (None, None) => request,
        }
    }

    fn post<B: Serialize, R: DeserializeOwned>(&self, path: &str, body: &B) -> Result<R> {
        let request = self.authorize(self.client.post(self.api_url(path)).json(body));
        let response = check(request.send()?, path)?;
        Ok(response.json()?)
    }

    /// Resolve (or create) the configured experiment, caching its ID.
    fn experiment_id(&mut self) -> Result<String> {
        if let Some(id) = &self.experiment_id {
            return Ok(id.clone());
        }

        let path = "experiments/get-by-name";
        let request = self.authorize(
            self.client
                .get(self.api_url(path))
                .query(&[("experiment_name", self.experiment_name.as_str())]),
        );
        let response = request.send()?;

        let id = if response.status() == StatusCode::NOT_FOUND {
            let created: CreateExperimentResponse = self.post(
                "experiments/create",
                &CreateExperiment {
                    name: &self.experiment_name,
                },
            )?;
            info!(
                experiment = %self.experiment_name,
                experiment_id = %created.experiment_id,
                "created MLflow experiment"
            );
            created.experiment_id
        } else {
            let found: GetExperimentResponse = check(response, path)?.json()?;
            found.experiment.experiment_id
        };

        self.experiment_id = Some(id.clone());
        Ok(id)
    }

    /// The run's artifact root, from `runs/create` or fetched with
    /// `runs/get` for runs this sink did not create.
    fn artifact_root(&mut self, run_id: &str) -> Result<String> {
        if let Some(uri) = self.artifact_roots.get(run_id) {
            return Ok(uri.clone());
        }

        let path = "runs/get";
        let request = self.authorize(
            self.client
                .get(self.api_url(path))
                .query(&[("run_id", run_id)]),
        );
        let found: RunResponse = check(request.send()?, path)?.json()?;
        let uri = found.run.info.artifact_uri.ok_or_else(|| {
            Error::Sink(format!("run {run_id} has no artifact_uri"))
        })?;
        self.artifact_roots.insert(run_id.to_string(), uri.clone());
        Ok(uri)
    }

    /// HTTP location of an artifact root.
    fn artifact_base_url(&self, root: &str) -> Result<String> {
        if let Some(rest) = root.strip_prefix("mlflow-artifacts:") {
            // mlflow-artifacts:/<path> or mlflow-artifacts://<authority>/<path>
            let path = rest.strip_prefix("//").map_or(rest, |authority| {
                authority.find('/').map_or("", |i| &authority[i..])
            });
            return Ok(format!(
                "{}/api/2.0/mlflow-artifacts/artifacts/{}",
                self.base_url,
                path.trim_matches('/')
            ));
        }
        if root.starts_with("http://") || root.starts_with("https://") {
            return Ok(root.trim_end_matches('/').to_string());
        }
        Err(Error::Sink(format!(
            "artifact store '{root}' is not reachable through the tracking server"
        )))
    }
}

fn check(response: Response, path: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(Error::Sink(format!("{path} returned {status}: {body}")))
}

impl TrackingSink for MlflowSink {
    fn create_run(&mut self, run_name: Option<&str>) -> Result<RunRecord> {
        let experiment_id = self.experiment_id()?;
        let created: RunResponse = self.post(
            "runs/create",
            &CreateRun {
                experiment_id: &experiment_id,
                start_time: Utc::now().timestamp_millis(),
                run_name,
            },
        )?;
        let info = created.run.info;
        debug!(run_id = %info.run_id, artifact_uri = ?info.artifact_uri, "created MLflow run");
        if let Some(uri) = info.artifact_uri {
            self.artifact_roots.insert(info.run_id.clone(), uri);
        }
        Ok(RunRecord::new(info.run_id, info.experiment_id))
    }

    fn log_param(&mut self, run_id: &str, key: &str, value: &str) -> Result<()> {
        let _: IgnoredAny = self.post("runs/log-parameter", &LogParam { run_id, key, value })?;
        Ok(())
    }

    fn log_metric(&mut self, run_id: &str, key: &str, value: f64, step: u64) -> Result<()> {
        let _: IgnoredAny = self.post(
            "runs/log-metric",
            &LogMetric {
                run_id,
                key,
                value,
                timestamp: Utc::now().timestamp_millis(),
                step,
            },
        )?;
        Ok(())
    }

    fn log_artifact(
        &mut self,
        run_id: &str,
        local_path: &Path,
        artifact_path: &str,
    ) -> Result<()> {
        let file_name = local_path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                Error::InvalidInput(format!(
                    "artifact path has no file name: {}",
                    local_path.display()
                ))
            })?;
        let bytes = std::fs::read(local_path)?;
        let root = self.artifact_root(run_id)?;
        let base = self.artifact_base_url(&root)?;

        let destination = [artifact_path.trim_matches('/'), file_name]
            .iter()
            .filter(|part| !part.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join("/");
        let url = format!("{base}/{destination}");

        let size = bytes.len();
        let request = self.authorize(self.client.put(url).body(bytes));
        check(request.send()?, "mlflow-artifacts/artifacts")?;
        info!(run_id, artifact = %destination, size, "uploaded artifact");
        Ok(())
    }

    fn set_status(&mut self, run_id: &str, status: RunStatus) -> Result<()> {
        let end_time = status
            .is_terminal()
            .then(|| Utc::now().timestamp_millis());
        let _: IgnoredAny = self.post(
            "runs/update",
            &UpdateRun {
                run_id,
                status: mlflow_status(status),
                end_time,
            },
        )?;
        Ok(())
    }
}
