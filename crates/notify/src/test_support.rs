//! Fakes shared by the notification tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;

use logpush_core::{Beat, LogEvent};
use logpush_rules::{ChatChannel, MailChannel, MailSender, Rule};

use crate::traits::{MailTransport, NotifyError, PushSink};

#[derive(Debug, Clone)]
pub(crate) struct SentMail {
    pub sender: String,
    pub subject: String,
    pub body: String,
}

/// Mail transport that fails for the listed sender addresses.
#[derive(Default)]
pub(crate) struct MockTransport {
    failing: HashSet<String>,
    stall: Option<Duration>,
    pub attempts: AtomicUsize,
    pub sent: Mutex<Vec<SentMail>>,
}

impl MockTransport {
    pub fn failing(senders: &[&str]) -> Self {
        Self {
            failing: senders.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn stalled(delay: Duration) -> Self {
        Self {
            stall: Some(delay),
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl MailTransport for MockTransport {
    async fn send(
        &self,
        sender: &MailSender,
        _recipients: &[String],
        subject: &str,
        html_body: &str,
    ) -> Result<(), NotifyError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.stall {
            tokio::time::sleep(delay).await;
        }
        if self.failing.contains(&sender.sender) {
            return Err(NotifyError::Smtp(format!("550 mailbox unavailable for {}", sender.sender)));
        }
        self.sent.lock().unwrap().push(SentMail {
            sender: sender.sender.clone(),
            subject: subject.to_string(),
            body: html_body.to_string(),
        });
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Push {
    pub token: String,
    pub title: String,
    pub content: String,
}

/// Push sink that accepts only known tokens and records what it got.
#[derive(Default)]
pub(crate) struct RecordingPush {
    tokens: HashSet<String>,
    pub pushes: Mutex<Vec<Push>>,
}

impl RecordingPush {
    pub fn with_tokens(tokens: &[&str]) -> Self {
        Self {
            tokens: tokens.iter().map(|t| t.to_string()).collect(),
            pushes: Mutex::new(Vec::new()),
        }
    }

    pub fn pushes(&self) -> Vec<Push> {
        self.pushes.lock().unwrap().clone()
    }
}

impl PushSink for RecordingPush {
    fn push(&self, token: &str, title: &str, content: &str) -> bool {
        if !self.tokens.contains(token) {
            return false;
        }
        self.pushes.lock().unwrap().push(Push {
            token: token.to_string(),
            title: title.to_string(),
            content: content.to_string(),
        });
        true
    }
}

pub(crate) fn sender(address: &str) -> MailSender {
    MailSender {
        smtp: "smtp.example.com".to_string(),
        port: 587,
        sender: address.to_string(),
        password: "pw".to_string(),
        tls: true,
    }
}

pub(crate) fn event_at(message: &str, timestamp: DateTime<Utc>) -> LogEvent {
    LogEvent {
        level: "ERROR".to_string(),
        input_type: "log".to_string(),
        source: "/data/logs/billing.2026-02-16.log".to_string(),
        message: message.to_string(),
        timestamp,
        tags: vec!["db".to_string(), "prod".to_string()],
        host: "host-1".to_string(),
        beat: Beat::default(),
    }
}

pub(crate) fn event(message: &str) -> LogEvent {
    event_at(message, Utc::now())
}

/// Builder for a `DB+PROD@ERROR` rule with both channels enabled.
pub(crate) struct RuleBuilder {
    chat_enabled: bool,
    chat_regex: String,
    chat_expiry: Option<Duration>,
    tokens: Vec<String>,
    mail_enabled: bool,
    flush_interval: Duration,
    mail_expiry: Option<Duration>,
    senders: Vec<MailSender>,
    max_batch_size: usize,
}

impl Default for RuleBuilder {
    fn default() -> Self {
        Self {
            chat_enabled: true,
            chat_regex: ".*".to_string(),
            chat_expiry: None,
            tokens: vec!["t1".to_string()],
            mail_enabled: true,
            flush_interval: Duration::from_secs(60),
            mail_expiry: None,
            senders: vec![sender("a@example.com")],
            max_batch_size: 50,
        }
    }
}

impl RuleBuilder {
    pub fn chat_enabled(mut self, enabled: bool) -> Self {
        self.chat_enabled = enabled;
        self
    }

    pub fn chat_regex(mut self, pattern: &str) -> Self {
        self.chat_regex = pattern.to_string();
        self
    }

    pub fn chat_expiry(mut self, expiry: Duration) -> Self {
        self.chat_expiry = Some(expiry);
        self
    }

    pub fn tokens(mut self, tokens: &[&str]) -> Self {
        self.tokens = tokens.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn mail_enabled(mut self, enabled: bool) -> Self {
        self.mail_enabled = enabled;
        self
    }

    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    pub fn mail_expiry(mut self, expiry: Duration) -> Self {
        self.mail_expiry = Some(expiry);
        self
    }

    pub fn senders(mut self, addresses: &[&str]) -> Self {
        self.senders = addresses.iter().map(|a| sender(a)).collect();
        self
    }

    pub fn max_batch_size(mut self, max: usize) -> Self {
        self.max_batch_size = max;
        self
    }

    pub fn build(self) -> Arc<Rule> {
        Arc::new(Rule {
            name: "DB+PROD@ERROR".to_string(),
            tags: ["DB", "PROD"].iter().map(|s| s.to_string()).collect(),
            levels: ["ERROR"].iter().map(|s| s.to_string()).collect(),
            ignore_contains: Vec::new(),
            chat: ChatChannel {
                enabled: self.chat_enabled,
                match_regex: Regex::new(&self.chat_regex).unwrap(),
                expiry: self.chat_expiry,
                senders: self.tokens,
            },
            mail: MailChannel::new(
                self.mail_enabled,
                self.flush_interval,
                self.mail_expiry,
                vec!["ops@example.com".to_string()],
                self.senders,
                self.max_batch_size,
            ),
        })
    }
}
