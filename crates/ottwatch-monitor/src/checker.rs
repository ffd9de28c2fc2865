use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::AsyncWriteExt;

use ottwatch_identity::Identity;

use crate::service::{CheckOutcome, CheckTarget, ServiceCheckSpec};

/// Default per-check timeout for the shipped checkers.
pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(60);

/// Infrastructure failures of a checker. Ordinary negative results are
/// `Ok(CheckOutcome { success: false, .. })`, not errors.
#[derive(Debug, thiserror::Error)]
pub enum CheckerError {
    #[error("{0} checks are not supported by this checker")]
    Unsupported(&'static str),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("check timed out after {0:?}")]
    Timeout(Duration),

    #[error("checker command failed: {0}")]
    Command(String),

    #[error("invalid checker output: {0}")]
    InvalidOutput(String),
}

/// Performs one playability/DRM check against one service.
///
/// Calls may block for tens of seconds; the orchestrator never runs two at
/// once because implementations usually own a single browser or device.
#[async_trait]
pub trait Checker: Send + Sync {
    async fn check(
        &self,
        spec: &ServiceCheckSpec,
        identity: &Identity,
    ) -> Result<CheckOutcome, CheckerError>;
}

// ── HttpChecker ─────────────────────────────────────────────────────

/// Reachability checker for browser targets: a 2xx answer counts as
/// playable. The response body is kept as the check artifact.
pub struct HttpChecker {
    client: reqwest::Client,
    artifacts_dir: PathBuf,
}

impl HttpChecker {
    pub fn new(artifacts_dir: impl Into<PathBuf>, timeout: Duration) -> Result<Self, CheckerError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            artifacts_dir: artifacts_dir.into(),
        })
    }

    async fn write_snapshot(&self, service: &str, body: &str) -> Option<String> {
        let path = artifact_path(&self.artifacts_dir, service, "html");
        if let Err(e) = tokio::fs::create_dir_all(&self.artifacts_dir).await {
            tracing::warn!(dir = %self.artifacts_dir.display(), error = %e, "Cannot create artifacts dir");
            return None;
        }
        match tokio::fs::write(&path, body).await {
            Ok(()) => Some(path.to_string_lossy().to_string()),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to write page snapshot");
                None
            }
        }
    }
}

#[async_trait]
impl Checker for HttpChecker {
    async fn check(
        &self,
        spec: &ServiceCheckSpec,
        identity: &Identity,
    ) -> Result<CheckOutcome, CheckerError> {
        let url = match &spec.target {
            CheckTarget::Browser { url } => url,
            CheckTarget::Mobile { .. } => return Err(CheckerError::Unsupported("mobile")),
        };

        let resp = match self.client.get(url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::info!(service = %spec.name, identity = %identity, error = %e, "Service unreachable");
                return Ok(CheckOutcome::failed(None).with_error(format!("http_error: {e}")));
            }
        };

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        let artifact = self.write_snapshot(&spec.name, &body).await;

        tracing::info!(
            service = %spec.name,
            identity = %identity,
            status = %status,
            "HTTP check {}",
            if status.is_success() { "PASS" } else { "FAIL" }
        );

        if status.is_success() {
            Ok(CheckOutcome::passed(artifact))
        } else {
            Ok(CheckOutcome::failed(artifact).with_error(format!("http_status: {status}")))
        }
    }
}

// ── CommandChecker ──────────────────────────────────────────────────

/// Delegates each check to an external automation program.
///
/// The program receives `{"spec": .., "identity": .., "artifacts_dir": ..}`
/// as JSON on stdin and must print a [`CheckOutcome`] JSON object on stdout.
/// A non-zero exit, a timeout or unparsable output is an infrastructure
/// failure.
pub struct CommandChecker {
    program: String,
    args: Vec<String>,
    timeout: Duration,
    artifacts_dir: PathBuf,
}

#[derive(serde::Serialize)]
struct CommandRequest<'a> {
    spec: &'a ServiceCheckSpec,
    identity: &'a Identity,
    artifacts_dir: &'a Path,
}

impl CommandChecker {
    /// `command[0]` is the program, the rest are its arguments.
    pub fn new(
        command: &[String],
        timeout: Duration,
        artifacts_dir: impl Into<PathBuf>,
    ) -> Result<Self, CheckerError> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| CheckerError::Command("empty checker command".to_string()))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            timeout,
            artifacts_dir: artifacts_dir.into(),
        })
    }
}

#[async_trait]
impl Checker for CommandChecker {
    async fn check(
        &self,
        spec: &ServiceCheckSpec,
        identity: &Identity,
    ) -> Result<CheckOutcome, CheckerError> {
        let request = serde_json::to_vec(&CommandRequest {
            spec,
            identity,
            artifacts_dir: &self.artifacts_dir,
        })
        .map_err(|e| CheckerError::InvalidOutput(e.to_string()))?;

        let mut child = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            // The program may exit without reading its input.
            if let Err(e) = stdin.write_all(&request).await {
                tracing::debug!(error = %e, "Checker command did not take its input");
            }
        }

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => return Err(CheckerError::Timeout(self.timeout)),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CheckerError::Command(format!(
                "{} ({})",
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let last_line = stdout
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .ok_or_else(|| CheckerError::InvalidOutput("no output".to_string()))?;
        let outcome: CheckOutcome = serde_json::from_str(last_line.trim())
            .map_err(|e| CheckerError::InvalidOutput(e.to_string()))?;

        tracing::info!(
            service = %spec.name,
            mode = spec.target.mode(),
            identity = %identity,
            success = outcome.success,
            drm = outcome.drm_handshake_detected,
            "Command check finished"
        );
        Ok(outcome)
    }
}

/// `shot_<service>_<YYYYmmdd_HHMMSS>.<ext>` under `dir`.
fn artifact_path(dir: &Path, service: &str, ext: &str) -> PathBuf {
    let safe: String = service
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    let stamp = Utc::now().format("%Y%m%d_%H%M%S");
    dir.join(format!("shot_{safe}_{stamp}.{ext}"))
}
