use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

const TELEGRAM_API: &str = "https://api.telegram.org";
const TEXT_TIMEOUT: Duration = Duration::from_secs(10);
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("notification rejected ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// Outbound operator alerts. Best-effort: the monitor logs failures and
/// never retries.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_text(&self, message: &str) -> Result<(), NotifyError>;

    /// Push a check artifact (screenshot, page snapshot) with a caption.
    async fn notify_artifact(&self, artifact: &str, caption: &str) -> Result<(), NotifyError>;
}

/// Swallows notifier failures on behalf of the monitor.
#[derive(Clone)]
pub(crate) struct Alerter {
    notifier: Arc<dyn Notifier>,
}

impl Alerter {
    pub(crate) fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    pub(crate) async fn text(&self, message: &str) {
        if let Err(e) = self.notifier.notify_text(message).await {
            tracing::warn!(error = %e, "Notification failed");
        }
    }

    pub(crate) async fn artifact(&self, artifact: Option<&str>, caption: &str) {
        let result = match artifact {
            Some(artifact) => self.notifier.notify_artifact(artifact, caption).await,
            None => self.notifier.notify_text(caption).await,
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "Notification failed");
        }
    }
}

/// Notifier that only writes to the log. Used when no push channel is set up.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_text(&self, message: &str) -> Result<(), NotifyError> {
        tracing::info!(alert = %message, "Alert");
        Ok(())
    }

    async fn notify_artifact(&self, artifact: &str, caption: &str) -> Result<(), NotifyError> {
        tracing::info!(alert = %caption, artifact = %artifact, "Alert");
        Ok(())
    }
}

/// Telegram Bot API notifier.
pub struct TelegramNotifier {
    client: reqwest::Client,
    base_url: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self::with_base_url(TELEGRAM_API, bot_token, chat_id)
    }

    /// Point at a different Bot API host (self-hosted server, tests).
    pub fn with_base_url(
        base_url: impl Into<String>,
        bot_token: impl Into<String>,
        chat_id: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.bot_token, method)
    }

    async fn check(resp: reqwest::Response) -> Result<(), NotifyError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(NotifyError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify_text(&self, message: &str) -> Result<(), NotifyError> {
        let resp = self
            .client
            .post(self.method_url("sendMessage"))
            .timeout(TEXT_TIMEOUT)
            .form(&[("chat_id", self.chat_id.as_str()), ("text", message)])
            .send()
            .await?;
        Self::check(resp).await
    }

    async fn notify_artifact(&self, artifact: &str, caption: &str) -> Result<(), NotifyError> {
        let path = Path::new(artifact);
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(artifact = %artifact, error = %e, "Artifact unreadable, sending caption only");
                return self.notify_text(caption).await;
            }
        };

        let (method, field) = if is_image(path) {
            ("sendPhoto", "photo")
        } else {
            ("sendDocument", "document")
        };
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "artifact".to_string());

        let form = reqwest::multipart::Form::new()
            .text("chat_id", self.chat_id.clone())
            .text("caption", caption.to_string())
            .part(field, reqwest::multipart::Part::bytes(bytes).file_name(file_name));

        let resp = self
            .client
            .post(self.method_url(method))
            .timeout(UPLOAD_TIMEOUT)
            .multipart(form)
            .send()
            .await?;
        Self::check(resp).await
    }
}

fn is_image(path: &Path) -> bool {
    matches!(
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref(),
        Some("png" | "jpg" | "jpeg" | "gif" | "webp")
    )
}
