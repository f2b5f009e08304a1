//! One validated configuration and everything started from it.
//!
//! A generation owns the rule registry, the push queues and the mail flush
//! tasks. Retiring it cancels its token; flush tasks deliver what is still
//! pending before they exit.

use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use logpush_core::config::DingSettings;
use logpush_core::{Config, LogEvent};
use logpush_notify::{
    AlertEngine, DingClient, EngineSettings, MailTransport, PushClient, PushRegistry, SmtpMailer,
    TemplateRenderer,
};
use logpush_rules::RuleRegistry;

/// Outbound collaborators shared by every generation.
#[derive(Clone)]
pub struct Delivery {
    pub transport: Arc<dyn MailTransport>,
    /// Builds the push client for a generation's `ding` settings.
    pub push_client: fn(&DingSettings) -> Arc<dyn PushClient>,
}

impl Delivery {
    /// SMTP and the DingTalk robot API.
    pub fn live() -> Self {
        Self {
            transport: Arc::new(SmtpMailer::new()),
            push_client: ding_client,
        }
    }
}

fn ding_client(settings: &DingSettings) -> Arc<dyn PushClient> {
    Arc::new(DingClient::new(settings.api_url.clone()))
}

pub struct Generation {
    pub id: Uuid,
    pub config: Config,
    pub engine: Arc<AlertEngine>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Generation {
    /// Validate `config` and start its push queues and flush tasks.
    ///
    /// Nothing is started when validation fails.
    pub fn start(config: Config, delivery: &Delivery) -> anyhow::Result<Self> {
        let registry = Arc::new(RuleRegistry::build(&config)?);
        let renderer = Arc::new(TemplateRenderer::from_dir(
            config.template_dir.as_deref(),
            config.data_center.clone(),
        )?);

        let cancel = CancellationToken::new();
        let (push, mut tasks) = PushRegistry::start(
            registry.chat_tokens(),
            (delivery.push_client)(&config.ding),
            &config.ding,
            &cancel,
        );

        let engine = Arc::new(AlertEngine::new(
            registry,
            Arc::new(push),
            Arc::clone(&delivery.transport),
            renderer,
            EngineSettings::from_config(&config),
        ));
        tasks.extend(engine.spawn_flush_tasks(&cancel));

        let id = Uuid::new_v4();
        info!(
            generation = %id,
            rules = engine.registry().len(),
            tasks = tasks.len(),
            "generation started"
        );

        Ok(Self {
            id,
            config,
            engine,
            cancel,
            tasks: Mutex::new(tasks),
        })
    }

    /// Hand every event to the engine and return how many were taken.
    /// Dispatch runs in the background.
    ///
    /// A request can still hold a generation that a reload has retired. Its
    /// flush tasks and push queues are gone, so those events are dropped.
    pub fn ingest(&self, events: Vec<LogEvent>) -> usize {
        if self.is_retired() {
            warn!(generation = %self.id, events = events.len(), "generation retired, events dropped");
            return 0;
        }

        let count = events.len();
        for event in events {
            self.engine.dispatch(event);
        }
        count
    }

    pub fn is_retired(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancel all tasks of this generation and wait for them to finish.
    pub async fn retire(&self) {
        self.cancel.cancel();
        let tasks = std::mem::take(&mut *self.tasks.lock().expect("generation tasks lock poisoned"));

        for task in tasks {
            if let Err(e) = task.await {
                warn!(generation = %self.id, error = %e, "generation task ended abnormally");
            }
        }
        info!(generation = %self.id, "generation retired");
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use logpush_notify::{NotifyError, PushMessage};
    use logpush_rules::MailSender;

    use super::*;

    #[derive(Default)]
    pub struct CountingMail {
        pub sent: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl MailTransport for CountingMail {
        async fn send(
            &self,
            _sender: &MailSender,
            _recipients: &[String],
            _subject: &str,
            _html_body: &str,
        ) -> Result<(), NotifyError> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct NoopPush;

    #[async_trait::async_trait]
    impl PushClient for NoopPush {
        async fn send(&self, _token: &str, _message: &PushMessage) -> Result<(), NotifyError> {
            Ok(())
        }
    }

    fn noop_push(_settings: &DingSettings) -> Arc<dyn PushClient> {
        Arc::new(NoopPush)
    }

    pub fn delivery(mail: Arc<CountingMail>) -> Delivery {
        Delivery {
            transport: mail,
            push_client: noop_push,
        }
    }

    pub const CONFIG: &str = r#"
timeZone: 8
rules:
  - tags: [db]
    levels: [error]
    ding:
      enable: true
      senders: [{token: t1}]
    mail:
      enable: true
      toPersons: [ops@example.com]
      senders:
        - {smtp: smtp.example.com, port: 587, sender: a@example.com, password: pw}
"#;

    pub fn config(yaml: &str) -> Config {
        Config::from_yaml_str(yaml).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::test_support::{config, delivery, CountingMail, CONFIG};
    use super::*;

    #[tokio::test]
    async fn start_builds_registry_and_tasks() {
        let generation = Generation::start(config(CONFIG), &delivery(Arc::default())).unwrap();
        assert_eq!(generation.engine.registry().len(), 1);
        // one push queue plus one flush task
        assert_eq!(generation.tasks.lock().unwrap().len(), 2);
        generation.retire().await;
    }

    #[tokio::test]
    async fn invalid_config_starts_nothing() {
        let yaml = "rules:\n  - {tags: [db], levels: [error]}\n  - {tags: [DB], levels: [ERROR]}\n";
        let err = Generation::start(config(yaml), &delivery(Arc::default()))
            .err()
            .expect("duplicate rule names are rejected");
        assert!(err.to_string().contains("DB@ERROR"), "got: {err}");
    }

    #[tokio::test]
    async fn retire_flushes_pending_mail() {
        let mail = Arc::new(CountingMail::default());
        let generation = Generation::start(config(CONFIG), &delivery(mail.clone())).unwrap();

        let rule = Arc::clone(generation.engine.registry().get("DB@ERROR").unwrap());
        rule.mail.enqueue("<p>boom</p>".to_string());

        generation.retire().await;
        assert!(generation.is_retired());
        assert_eq!(mail.sent.load(Ordering::SeqCst), 1);
        assert_eq!(rule.mail.pending_len(), 0);
    }

    #[tokio::test]
    async fn retired_generation_drops_ingested_events() {
        let mail = Arc::new(CountingMail::default());
        let generation = Generation::start(config(CONFIG), &delivery(mail.clone())).unwrap();
        generation.retire().await;

        let event = logpush_core::normalize_payload(
            br#"{"level":"ERROR","message":"late","tags":["db"],"host":"h1","@timestamp":"2026-02-16T08:21:28.942Z"}"#,
            generation.config.time_zone,
        )
        .unwrap();
        assert_eq!(generation.ingest(event), 0);

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let rule = generation.engine.registry().get("DB@ERROR").unwrap();
        assert_eq!(rule.mail.pending_len(), 0);
        assert_eq!(mail.sent.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn live_generation_takes_every_event() {
        let generation = Generation::start(config(CONFIG), &delivery(Arc::default())).unwrap();
        let events = logpush_core::normalize_payload(
            br#"[{"level":"ERROR","message":"a","tags":["db"],"host":"h1","@timestamp":"2026-02-16T08:21:28.942Z"},{"level":"ERROR","message":"b","tags":["db"],"host":"h1","@timestamp":"2026-02-16T08:21:28.942Z"}]"#,
            generation.config.time_zone,
        )
        .unwrap();
        assert_eq!(generation.ingest(events), 2);
        generation.retire().await;
    }
}
