//! Routes matched events to the chat and mail channels of each rule.
//!
//! The engine receives a normalized event, asks the registry which rules
//! fire and hands every rule to its channels as independent tasks. A
//! failure on one rule or channel never blocks the others.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use logpush_core::{Config, LogEvent};
use logpush_rules::RuleRegistry;

use crate::chat::ChatDispatcher;
use crate::limiter::DailyLimiter;
use crate::mail::MailAggregator;
use crate::templating::TemplateRenderer;
use crate::traits::{MailTransport, PushSink};

/// Engine settings lifted from the top-level configuration.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub data_center: Option<String>,
    pub log_path_prefix: String,
    pub send_timeout: Duration,
    pub max_per_day: u64,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            data_center: config.data_center.clone(),
            log_path_prefix: config.log_path_prefix.clone(),
            send_timeout: Duration::from_secs(config.send_timeout_secs.max(1)),
            max_per_day: config.max_per_day,
        }
    }
}

/// Fan-out for one configuration generation.
pub struct AlertEngine {
    registry: Arc<RuleRegistry>,
    chat: ChatDispatcher,
    mail: Arc<MailAggregator>,
    limiter: DailyLimiter,
}

impl AlertEngine {
    pub fn new(
        registry: Arc<RuleRegistry>,
        push: Arc<dyn PushSink>,
        transport: Arc<dyn MailTransport>,
        renderer: Arc<TemplateRenderer>,
        settings: EngineSettings,
    ) -> Self {
        let chat = ChatDispatcher::new(
            Arc::clone(&push),
            Arc::clone(&renderer),
            settings.log_path_prefix,
        );
        let mail = Arc::new(MailAggregator::new(
            transport,
            push,
            renderer,
            settings.data_center,
            settings.send_timeout,
        ));

        Self {
            registry,
            chat,
            mail,
            limiter: DailyLimiter::new(settings.max_per_day, Utc::now()),
        }
    }

    pub fn registry(&self) -> &Arc<RuleRegistry> {
        &self.registry
    }

    /// Match `event` and start one task per fired rule. Returns immediately;
    /// the handles are only useful to tests and shutdown.
    pub fn dispatch(self: &Arc<Self>, event: LogEvent) -> Vec<JoinHandle<()>> {
        let now = Utc::now();
        let matched = self.registry.match_event(&event);
        if matched.is_empty() {
            return Vec::new();
        }

        let event = Arc::new(event);
        let mut handles = Vec::with_capacity(matched.len());

        for rule in matched {
            if !self.limiter.admit(&rule.name, &event, now) {
                continue;
            }

            debug!(rule = %rule.name, level = %event.level, host = %event.host, "rule fired");

            let engine = Arc::clone(self);
            let event = Arc::clone(&event);
            handles.push(tokio::spawn(async move {
                engine.chat.dispatch(&rule, &event, now);

                if let Err(e) = engine.mail.enqueue(&rule, &event, now) {
                    warn!(rule = %rule.name, error = %e, "mail entry not rendered");
                }
            }));
        }

        handles
    }

    /// Start one flush task per rule with an enabled mail channel.
    pub fn spawn_flush_tasks(&self, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
        self.registry
            .mail_rules()
            .map(|rule| {
                tokio::spawn(Arc::clone(&self.mail).run(Arc::clone(rule), cancel.child_token()))
            })
            .collect()
    }
}
