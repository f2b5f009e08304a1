//! Mail aggregation: per-event enqueue, periodic flush with sender failover
//! and chat escalation when the whole pool fails.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use logpush_core::LogEvent;
use logpush_rules::{MailBatch, MailSender, Rule};

use crate::templating::{TemplateRenderer, Variant};
use crate::traits::{MailTransport, NotifyError, PushSink};

/// Joins batch entries in the mail body.
pub const SEPARATOR: &str = "<br/><hr/><br/>";

/// Ceiling for the chat fallback report, in characters.
pub const MAX_FALLBACK_CHARS: usize = 15_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Disabled,
    Expired,
    /// Queued; carries the pending length after the append.
    Queued(usize),
}

/// Result of one flush tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was pending.
    Idle,
    Delivered {
        sender: String,
        attempts: usize,
        count: usize,
        dropped: usize,
    },
    /// Every sender failed; the report went to `pushed` chat tokens.
    Escalated { attempts: usize, pushed: usize },
}

pub struct MailAggregator {
    transport: Arc<dyn MailTransport>,
    push: Arc<dyn PushSink>,
    renderer: Arc<TemplateRenderer>,
    data_center: Option<String>,
    send_timeout: Duration,
}

impl MailAggregator {
    pub fn new(
        transport: Arc<dyn MailTransport>,
        push: Arc<dyn PushSink>,
        renderer: Arc<TemplateRenderer>,
        data_center: Option<String>,
        send_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            push,
            renderer,
            data_center,
            send_timeout,
        }
    }

    /// Render `event` and append it to `rule`'s pending queue.
    ///
    /// Only touches the queue; sending happens in [`MailAggregator::flush`].
    pub fn enqueue(
        &self,
        rule: &Rule,
        event: &LogEvent,
        now: DateTime<Utc>,
    ) -> Result<EnqueueOutcome, NotifyError> {
        let mail = &rule.mail;
        if !mail.enabled {
            return Ok(EnqueueOutcome::Disabled);
        }

        if let Some(expiry) = mail.expiry {
            if event.is_older_than(expiry, now) {
                debug!(
                    rule = %rule.name,
                    timestamp = %event.timestamp,
                    expiry_secs = expiry.as_secs(),
                    "event too old for mail"
                );
                return Ok(EnqueueOutcome::Expired);
            }
        }

        let html = self.renderer.render(event, Variant::Html, &rule.name)?;
        let pending = mail.enqueue(html);
        debug!(rule = %rule.name, pending, "mail entry queued");
        Ok(EnqueueOutcome::Queued(pending))
    }

    /// Subject line for a batch, e.g. `[hz] [DB,PROD] 3 alerts in 60s, ignore: 2`.
    pub fn subject(&self, rule: &Rule, batch: &MailBatch) -> String {
        let mut subject = String::new();
        if let Some(dc) = self.data_center.as_deref().filter(|dc| !dc.is_empty()) {
            subject.push_str(&format!("[{dc}] "));
        }
        subject.push_str(&format!(
            "[{}] {} alerts in {}s",
            rule.tag_label(),
            batch.entries.len(),
            rule.mail.flush_interval.as_secs()
        ));
        if batch.dropped > 0 {
            subject.push_str(&format!(", ignore: {}", batch.dropped));
        }
        subject
    }

    /// Drain `rule`'s queue into one mail and deliver it.
    ///
    /// Tries each sender at most once, starting at the channel cursor. The
    /// queue is cleared before any network call, whatever the outcome.
    pub async fn flush(&self, rule: &Rule) -> FlushOutcome {
        let Some(batch) = rule.mail.take_batch() else {
            return FlushOutcome::Idle;
        };

        let count = batch.entries.len();
        let subject = self.subject(rule, &batch);
        let body = batch.entries.join(SEPARATOR);

        if batch.dropped > 0 {
            warn!(rule = %rule.name, dropped = batch.dropped, "mail batch over size limit, excess dropped");
        }

        let mut errors = Vec::new();
        for attempt in 1..=rule.mail.senders.len() {
            let Some((index, sender)) = rule.mail.next_sender() else {
                break;
            };

            match self.send_once(sender, &rule.mail.recipients, &subject, &body).await {
                Ok(()) => {
                    info!(
                        rule = %rule.name,
                        sender = %sender.sender,
                        attempt,
                        count,
                        dropped = batch.dropped,
                        "mail batch delivered"
                    );
                    return FlushOutcome::Delivered {
                        sender: sender.sender.clone(),
                        attempts: attempt,
                        count,
                        dropped: batch.dropped,
                    };
                }
                Err(e) => {
                    warn!(
                        rule = %rule.name,
                        sender = %sender.sender,
                        index,
                        attempt,
                        error = %e,
                        "mail send failed, trying next sender"
                    );
                    errors.push(format!("{}: {e}", sender.sender));
                }
            }
        }

        let attempts = errors.len();
        let pushed = self.escalate(rule, &subject, &errors, &body);
        FlushOutcome::Escalated { attempts, pushed }
    }

    async fn send_once(
        &self,
        sender: &MailSender,
        recipients: &[String],
        subject: &str,
        body: &str,
    ) -> Result<(), NotifyError> {
        let send = self.transport.send(sender, recipients, subject, body);
        match tokio::time::timeout(self.send_timeout, send).await {
            Ok(result) => result,
            Err(_) => Err(NotifyError::Timeout(self.send_timeout)),
        }
    }

    /// Push the failure report to every chat token of `rule`, ignoring the
    /// chat channel's own gates. Returns how many tokens accepted it.
    fn escalate(&self, rule: &Rule, subject: &str, errors: &[String], body: &str) -> usize {
        let report = fallback_report(subject, errors, body);
        let title = format!("mail delivery failed: {}", rule.name);

        let pushed = rule
            .chat
            .senders
            .iter()
            .filter(|token| self.push.push(token, &title, &report))
            .count();

        error!(
            rule = %rule.name,
            attempts = errors.len(),
            tokens = rule.chat.senders.len(),
            pushed,
            "all mail senders failed, batch escalated to chat"
        );
        if pushed == 0 {
            error!(rule = %rule.name, "no chat token accepted the fallback report, batch lost");
        }
        pushed
    }

    /// Flush `rule` every `flush_interval` until `cancel` fires, then flush
    /// once more and return.
    pub async fn run(self: Arc<Self>, rule: Arc<Rule>, cancel: CancellationToken) {
        let period = rule.mail.flush_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(rule = %rule.name, interval_secs = period.as_secs(), "mail flush task started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let outcome = self.flush(&rule).await;
                    debug!(rule = %rule.name, ?outcome, "final flush");
                    break;
                }
                _ = ticker.tick() => {
                    let outcome = self.flush(&rule).await;
                    if outcome != FlushOutcome::Idle {
                        debug!(rule = %rule.name, ?outcome, "flush tick");
                    }
                }
            }
        }

        info!(rule = %rule.name, "mail flush task stopped");
    }
}

/// Error lines followed by the batch body, cut to [`MAX_FALLBACK_CHARS`].
pub fn fallback_report(subject: &str, errors: &[String], body: &str) -> String {
    let mut report = format!("All mail senders failed for: {subject}\n\n");
    for e in errors {
        report.push_str("- ");
        report.push_str(e);
        report.push('\n');
    }
    report.push('\n');
    report.push_str(body);
    truncate_chars(report, MAX_FALLBACK_CHARS)
}

fn truncate_chars(mut s: String, max: usize) -> String {
    if let Some((idx, _)) = s.char_indices().nth(max) {
        s.truncate(idx);
    }
    s
}
