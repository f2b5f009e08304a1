//! Immutable rule table built once per configuration generation.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tracing::{info, warn};

use logpush_core::config::{DingConfig, MailConfig, RuleConfig};
use logpush_core::{Config, LogEvent};

use crate::error::{Result, RuleError};
use crate::matcher;
use crate::rule::{derive_name, ChatChannel, MailChannel, MailSender, Rule};

/// Flush interval used when a mail channel does not set `duration`.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(60);
/// Smallest flush interval accepted from configuration.
pub const MIN_FLUSH_INTERVAL: Duration = Duration::from_secs(10);

/// Validated rules of one configuration generation.
///
/// Read-only after [`RuleRegistry::build`]; only the mail channels' internal
/// queues mutate, behind their own locks.
#[derive(Debug, Default)]
pub struct RuleRegistry {
    rules: Vec<Arc<Rule>>,
}

impl RuleRegistry {
    /// Normalize, name and validate every rule in `config`.
    pub fn build(config: &Config) -> Result<Self> {
        if config.max_batch_size == 0 {
            return Err(RuleError::InvalidBatchSize);
        }

        let mut names = HashSet::new();
        let mut rules = Vec::with_capacity(config.rules.len());

        for rule_cfg in &config.rules {
            let rule = build_rule(rule_cfg, config.max_batch_size)?;
            if !names.insert(rule.name.clone()) {
                return Err(RuleError::DuplicateName { name: rule.name });
            }
            info!(
                rule = %rule.name,
                chat = rule.chat.enabled,
                mail = rule.mail.enabled,
                "rule registered"
            );
            rules.push(Arc::new(rule));
        }

        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[Arc<Rule>] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Rule>> {
        self.rules.iter().find(|r| r.name == name)
    }

    /// Distinct tokens across all enabled chat channels.
    pub fn chat_tokens(&self) -> BTreeSet<String> {
        self.rules
            .iter()
            .filter(|r| r.chat.enabled)
            .flat_map(|r| r.chat.senders.iter().cloned())
            .collect()
    }

    /// Rules whose mail channel needs a flush task.
    pub fn mail_rules(&self) -> impl Iterator<Item = &Arc<Rule>> {
        self.rules.iter().filter(|r| r.mail.enabled)
    }

    /// Rules that fire for `event`, after ignore-list suppression.
    pub fn match_event(&self, event: &LogEvent) -> Vec<Arc<Rule>> {
        matcher::match_event(event, &self.rules)
    }
}

fn normalize(items: &[String]) -> BTreeSet<String> {
    items
        .iter()
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Rule names join tags with `+`, tags and levels with `@`, and write an
/// empty side as `*`; none of these may appear inside a value.
fn check_name_part(field: &'static str, values: &BTreeSet<String>) -> Result<()> {
    match values
        .iter()
        .find(|v| v.contains(['+', '@']) || v.as_str() == "*")
    {
        Some(value) => Err(RuleError::ReservedNameCharacter {
            field,
            value: value.clone(),
        }),
        None => Ok(()),
    }
}

fn build_rule(cfg: &RuleConfig, max_batch_size: usize) -> Result<Rule> {
    let tags = normalize(&cfg.tags);
    let levels = normalize(&cfg.levels);
    check_name_part("tag", &tags)?;
    check_name_part("level", &levels)?;
    let name = derive_name(&tags, &levels);

    let chat = build_chat(&name, &cfg.ding)?;
    let mail = build_mail(&name, &cfg.mail, max_batch_size)?;

    Ok(Rule {
        name,
        tags,
        levels,
        ignore_contains: cfg
            .ignore_contains
            .iter()
            .filter(|s| !s.is_empty())
            .cloned()
            .collect(),
        chat,
        mail,
    })
}

fn expiry(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

fn build_chat(rule: &str, cfg: &DingConfig) -> Result<ChatChannel> {
    let pattern = cfg.match_regex.as_deref().map(str::trim).unwrap_or("");
    let pattern = if pattern.is_empty() { ".*" } else { pattern };
    let match_regex = Regex::new(pattern).map_err(|source| RuleError::InvalidRegex {
        rule: rule.to_string(),
        source,
    })?;

    let senders: Vec<String> = cfg.senders.iter().map(|s| s.token.trim().to_string()).collect();
    if cfg.enable {
        if let Some(index) = senders.iter().position(|t| t.is_empty()) {
            return Err(RuleError::EmptyToken {
                rule: rule.to_string(),
                index,
            });
        }
        if senders.is_empty() {
            warn!(rule, "ding channel enabled without senders, pushes will be dropped");
        }
    }

    Ok(ChatChannel {
        enabled: cfg.enable,
        match_regex,
        expiry: expiry(cfg.ignore_if_gt_secs),
        senders,
    })
}

fn build_mail(rule: &str, cfg: &MailConfig, max_batch_size: usize) -> Result<MailChannel> {
    let flush_interval = match cfg.duration {
        None | Some(0) => DEFAULT_FLUSH_INTERVAL,
        Some(secs) => {
            let interval = Duration::from_secs(secs);
            if cfg.enable && interval < MIN_FLUSH_INTERVAL {
                return Err(RuleError::FlushIntervalTooSmall {
                    rule: rule.to_string(),
                    secs,
                    min: MIN_FLUSH_INTERVAL.as_secs(),
                });
            }
            interval
        }
    };

    let senders: Vec<MailSender> = cfg
        .senders
        .iter()
        .map(|s| MailSender {
            smtp: s.smtp.trim().to_string(),
            port: s.port,
            sender: s.sender.trim().to_string(),
            password: s.password.clone(),
            tls: s.tls.unwrap_or(true),
        })
        .collect();

    let recipients: Vec<String> = cfg
        .to_persons
        .iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect();

    if cfg.enable {
        if recipients.is_empty() {
            return Err(RuleError::MissingRecipients {
                rule: rule.to_string(),
            });
        }
        if senders.is_empty() {
            return Err(RuleError::MissingSenders {
                rule: rule.to_string(),
            });
        }
        for (index, s) in senders.iter().enumerate() {
            let missing = if s.smtp.is_empty() {
                Some("smtp")
            } else if s.port == 0 {
                Some("port")
            } else if s.sender.is_empty() {
                Some("sender")
            } else if s.password.is_empty() {
                Some("password")
            } else {
                None
            };
            if let Some(field) = missing {
                return Err(RuleError::MissingCredentials {
                    rule: rule.to_string(),
                    index,
                    field,
                });
            }
        }
    }

    Ok(MailChannel::new(
        cfg.enable,
        flush_interval,
        expiry(cfg.ignore_if_gt_secs),
        recipients,
        senders,
        max_batch_size,
    ))
}
