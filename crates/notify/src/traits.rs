//! Collaborator traits and shared error types.

use std::time::Duration;

use logpush_rules::MailSender;

/// Errors that can occur during notification delivery.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("SMTP delivery failed: {0}")]
    Smtp(String),

    #[error("Push rejected: {0}")]
    Push(String),

    #[error("Template rendering failed: {0}")]
    Template(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

/// Synchronous-looking mail delivery through one sender's credentials.
///
/// Implementations do not retry; failover across senders is the caller's job.
#[async_trait::async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(
        &self,
        sender: &MailSender,
        recipients: &[String],
        subject: &str,
        html_body: &str,
    ) -> Result<(), NotifyError>;
}

/// Fire-and-forget chat push keyed by bot token.
pub trait PushSink: Send + Sync {
    /// Submit a push. Returns `false` when no queue is registered for `token`.
    fn push(&self, token: &str, title: &str, content: &str) -> bool;
}

/// A chat push waiting in a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushMessage {
    pub title: String,
    pub content: String,
}

/// Network client behind a push queue.
#[async_trait::async_trait]
pub trait PushClient: Send + Sync {
    async fn send(&self, token: &str, message: &PushMessage) -> Result<(), NotifyError>;
}

/// Shorten a bot token for log output.
pub fn mask_token(token: &str) -> String {
    let visible: String = token.chars().take(6).collect();
    if visible.len() < token.len() {
        format!("{visible}…")
    } else {
        visible
    }
}
