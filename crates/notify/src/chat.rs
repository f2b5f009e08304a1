//! Immediate chat pushes for matched events.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use logpush_core::LogEvent;
use logpush_rules::Rule;

use crate::templating::{TemplateRenderer, Variant};
use crate::traits::{mask_token, PushSink};

/// What happened to one event on one rule's chat channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatOutcome {
    Disabled,
    Expired,
    /// The channel regex did not match the message.
    Filtered,
    Pushed { accepted: usize, dropped: usize },
}

/// Gates events through a chat channel and hands them to the push queues.
pub struct ChatDispatcher {
    push: Arc<dyn PushSink>,
    renderer: Arc<TemplateRenderer>,
    log_path_prefix: String,
}

impl ChatDispatcher {
    pub fn new(
        push: Arc<dyn PushSink>,
        renderer: Arc<TemplateRenderer>,
        log_path_prefix: impl Into<String>,
    ) -> Self {
        Self {
            push,
            renderer,
            log_path_prefix: log_path_prefix.into(),
        }
    }

    /// Push `event` to every token of `rule`'s chat channel.
    ///
    /// Never waits on delivery; a token without a queue only counts as dropped.
    pub fn dispatch(&self, rule: &Rule, event: &LogEvent, now: DateTime<Utc>) -> ChatOutcome {
        let chat = &rule.chat;
        if !chat.enabled {
            return ChatOutcome::Disabled;
        }

        if let Some(expiry) = chat.expiry {
            if event.is_older_than(expiry, now) {
                debug!(
                    rule = %rule.name,
                    timestamp = %event.timestamp,
                    expiry_secs = expiry.as_secs(),
                    "event too old for chat push"
                );
                return ChatOutcome::Expired;
            }
        }

        if !chat.match_regex.is_match(&event.message) {
            debug!(rule = %rule.name, regex = %chat.match_regex, "message does not match chat regex");
            return ChatOutcome::Filtered;
        }

        let title = event.source_title(&self.log_path_prefix);
        let content = self.content(event, title);

        let mut accepted = 0;
        for token in &chat.senders {
            if self.push.push(token, title, &content) {
                accepted += 1;
            } else {
                debug!(rule = %rule.name, token = %mask_token(token), "chat push dropped");
            }
        }

        ChatOutcome::Pushed {
            accepted,
            dropped: chat.senders.len() - accepted,
        }
    }

    fn content(&self, event: &LogEvent, title: &str) -> String {
        let mut short = event.clone();
        short.message = event.short_message().to_string();

        match self.renderer.render(&short, Variant::Plain, title) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "plain template failed, pushing raw message");
                format!("{title}\n\n{}", short.message)
            }
        }
    }
}
