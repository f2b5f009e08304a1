//! DingTalk robot push queues.
//!
//! Every enabled bot token gets its own [`PushQueue`]: an unbounded channel
//! drained by a worker task that throttles to `limit` messages per
//! `interval` and posts markdown messages to the robot webhook.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use logpush_core::config::DingSettings;

use crate::traits::{mask_token, NotifyError, PushClient, PushMessage, PushSink};

// ── HTTP client ─────────────────────────────────────────────────────

/// Posts markdown messages to the DingTalk robot webhook.
#[derive(Debug, Clone)]
pub struct DingClient {
    api_url: String,
    client: reqwest::Client,
}

impl DingClient {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, token: &str) -> String {
        format!("{}?access_token={}", self.api_url, token)
    }

    fn body(message: &PushMessage) -> serde_json::Value {
        serde_json::json!({
            "msgtype": "markdown",
            "markdown": {
                "title": message.title,
                "text": format!("### {}\n\n{}", message.title, message.content),
            },
        })
    }
}

#[async_trait::async_trait]
impl PushClient for DingClient {
    async fn send(&self, token: &str, message: &PushMessage) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(self.url(token))
            .json(&Self::body(message))
            .send()
            .await
            .map_err(|e| NotifyError::Http(e.without_url()))?;

        let status = response.status();
        let resp_body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| NotifyError::Http(e.without_url()))?;

        let errcode = resp_body.get("errcode").and_then(|v| v.as_i64()).unwrap_or(-1);
        if status.is_success() && errcode == 0 {
            debug!(token = %mask_token(token), "ding push delivered");
            return Ok(());
        }

        let errmsg = resp_body
            .get("errmsg")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown DingTalk API error");
        Err(NotifyError::Push(format!("{status} errcode={errcode}: {errmsg}")))
    }
}

// ── Throttle ────────────────────────────────────────────────────────

/// Fixed-window limiter: at most `limit` sends per `interval`.
#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    limit: usize,
    window_start: Instant,
    sent: usize,
}

impl Throttle {
    pub fn new(interval: Duration, limit: usize, now: Instant) -> Self {
        Self {
            interval,
            limit: limit.max(1),
            window_start: now,
            sent: 0,
        }
    }

    /// Take a slot at `now`. Returns the instant to wait for when the current
    /// window is exhausted.
    pub fn admit(&mut self, now: Instant) -> Option<Instant> {
        let window_end = self.window_start + self.interval;
        if now >= window_end {
            self.window_start = now;
            self.sent = 0;
        }
        if self.sent < self.limit {
            self.sent += 1;
            None
        } else {
            Some(self.window_start + self.interval)
        }
    }
}

// ── Queue ───────────────────────────────────────────────────────────

/// Handle to one token's queue.
#[derive(Debug, Clone)]
pub struct PushQueue {
    tx: mpsc::UnboundedSender<PushMessage>,
}

impl PushQueue {
    /// Start the worker for `token`. The worker stops when `cancel` fires.
    pub fn start(
        token: String,
        client: Arc<dyn PushClient>,
        interval: Duration,
        limit: usize,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let throttle = Throttle::new(interval, limit, Instant::now());
        let handle = tokio::spawn(run_queue(token, rx, client, throttle, cancel));
        (Self { tx }, handle)
    }

    /// Enqueue without waiting. Returns `false` once the worker has stopped.
    pub fn submit(&self, message: PushMessage) -> bool {
        self.tx.send(message).is_ok()
    }
}

async fn run_queue(
    token: String,
    mut rx: mpsc::UnboundedReceiver<PushMessage>,
    client: Arc<dyn PushClient>,
    mut throttle: Throttle,
    cancel: CancellationToken,
) {
    let masked = mask_token(&token);
    debug!(token = %masked, "push queue started");

    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => break,
            next = rx.recv() => match next {
                Some(m) => m,
                None => break,
            },
        };

        while let Some(until) = throttle.admit(Instant::now()) {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(token = %masked, "push queue stopped while throttled");
                    return;
                }
                _ = tokio::time::sleep_until(until) => {}
            }
        }

        if let Err(e) = client.send(&token, &message).await {
            warn!(token = %masked, title = %message.title, error = %e, "ding push failed");
        }
    }

    debug!(token = %masked, "push queue stopped");
}

// ── Registry ────────────────────────────────────────────────────────

/// Token → queue map, populated once per configuration generation.
#[derive(Debug, Default)]
pub struct PushRegistry {
    queues: HashMap<String, PushQueue>,
    title_prefix: String,
}

impl PushRegistry {
    /// Start one queue per token. Returned handles belong to the generation.
    pub fn start(
        tokens: impl IntoIterator<Item = String>,
        client: Arc<dyn PushClient>,
        settings: &DingSettings,
        cancel: &CancellationToken,
    ) -> (Self, Vec<JoinHandle<()>>) {
        let interval = Duration::from_secs(settings.interval_secs);
        let mut queues = HashMap::new();
        let mut handles = Vec::new();

        for token in tokens {
            if queues.contains_key(&token) {
                continue;
            }
            let (queue, handle) = PushQueue::start(
                token.clone(),
                Arc::clone(&client),
                interval,
                settings.limit,
                cancel.child_token(),
            );
            queues.insert(token, queue);
            handles.push(handle);
        }

        info!(queues = queues.len(), "push queues started");
        (
            Self {
                queues,
                title_prefix: settings.title.clone(),
            },
            handles,
        )
    }

    pub fn len(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

}

impl PushSink for PushRegistry {
    fn push(&self, token: &str, title: &str, content: &str) -> bool {
        let Some(queue) = self.queues.get(token) else {
            warn!(token = %mask_token(token), "no push queue registered for token, dropping push");
            return false;
        };

        let title = if self.title_prefix.is_empty() {
            title.to_string()
        } else {
            format!("{} {}", self.title_prefix, title)
        };

        let accepted = queue.submit(PushMessage {
            title,
            content: content.to_string(),
        });
        if !accepted {
            warn!(token = %mask_token(token), "push queue closed, dropping push");
        }
        accepted
    }
}
