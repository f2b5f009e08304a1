use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn default_address() -> String {
    "0.0.0.0:5678".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_batch_size() -> usize {
    50
}

fn default_log_path_prefix() -> String {
    "/data/logs/".to_string()
}

fn default_send_timeout_secs() -> u64 {
    30
}

// ── Top-level config ──────────────────────────────────────────

/// Fully parsed configuration file.
///
/// Field names follow the camelCase keys of the on-disk format; `filters` is
/// accepted as an older spelling of `rules`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Optional datacenter tag prepended to mail subjects.
    #[serde(default)]
    pub data_center: Option<String>,
    /// Cap on messages per mail flush.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    /// Signed hour offset added to every event timestamp.
    #[serde(default)]
    pub time_zone: i8,
    /// Per-day cap on dispatches of the same alarm, 0 disables it.
    #[serde(default)]
    pub max_per_day: u64,
    #[serde(default = "default_log_path_prefix")]
    pub log_path_prefix: String,
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,
    #[serde(default)]
    pub template_dir: Option<PathBuf>,
    #[serde(default)]
    pub ding: DingSettings,
    #[serde(default, alias = "filters")]
    pub rules: Vec<RuleConfig>,
}

impl Config {
    /// Parse a YAML (or JSON) document.
    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Apply `LOGPUSH_*` environment overrides on top of the file values.
    pub fn apply_env_overrides(&mut self) {
        if let Some(address) = env_opt("LOGPUSH_ADDRESS") {
            self.address = address;
        }
        if let Some(level) = env_opt("LOGPUSH_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(dc) = env_opt("LOGPUSH_DATA_CENTER") {
            self.data_center = Some(dc);
        }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded:");
        tracing::info!("  address:     {}", self.address);
        tracing::info!("  log level:   {}", self.log_level);
        tracing::info!("  datacenter:  {}", self.data_center.as_deref().unwrap_or("(none)"));
        tracing::info!("  time zone:   {:+}h", self.time_zone);
        tracing::info!("  batch size:  {}", self.max_batch_size);
        tracing::info!("  max per day: {}", self.max_per_day);
        tracing::info!("  rules:       {}", self.rules.len());
    }

    /// Return a redacted view safe for API responses (no tokens or passwords).
    pub fn redacted_summary(&self) -> serde_json::Value {
        let rules: Vec<serde_json::Value> = self
            .rules
            .iter()
            .map(|r| {
                serde_json::json!({
                    "tags": r.tags,
                    "levels": r.levels,
                    "ding": { "enable": r.ding.enable, "senders": r.ding.senders.len() },
                    "mail": {
                        "enable": r.mail.enable,
                        "recipients": r.mail.to_persons.len(),
                        "senders": r.mail.senders.len(),
                    },
                })
            })
            .collect();

        serde_json::json!({
            "address": self.address,
            "dataCenter": self.data_center,
            "maxBatchSize": self.max_batch_size,
            "timeZone": self.time_zone,
            "maxPerDay": self.max_per_day,
            "rules": rules,
        })
    }
}

// ── Chat push queue ───────────────────────────────────────────

fn default_ding_api_url() -> String {
    "https://oapi.dingtalk.com/robot/send".to_string()
}

fn default_ding_interval_secs() -> u64 {
    3
}

fn default_ding_limit() -> usize {
    1
}

fn default_ding_title() -> String {
    "[ALERT]".to_string()
}

/// Settings shared by every chat push queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DingSettings {
    #[serde(default = "default_ding_api_url")]
    pub api_url: String,
    /// Throttle window length.
    #[serde(default = "default_ding_interval_secs")]
    pub interval_secs: u64,
    /// Messages allowed per window.
    #[serde(default = "default_ding_limit")]
    pub limit: usize,
    #[serde(default = "default_ding_title")]
    pub title: String,
}

impl Default for DingSettings {
    fn default() -> Self {
        Self {
            api_url: default_ding_api_url(),
            interval_secs: default_ding_interval_secs(),
            limit: default_ding_limit(),
            title: default_ding_title(),
        }
    }
}

// ── Rules ─────────────────────────────────────────────────────

/// One alerting rule as written in the configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleConfig {
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub levels: Vec<String>,
    #[serde(default)]
    pub ignore_contains: Vec<String>,
    #[serde(default)]
    pub ding: DingConfig,
    #[serde(default)]
    pub mail: MailConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DingConfig {
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub match_regex: Option<String>,
    /// Events older than this many seconds are not pushed; 0 disables the check.
    #[serde(default)]
    pub ignore_if_gt_secs: u64,
    #[serde(default)]
    pub senders: Vec<DingSenderConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DingSenderConfig {
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailConfig {
    #[serde(default)]
    pub enable: bool,
    /// Flush interval in seconds.
    #[serde(default)]
    pub duration: Option<u64>,
    #[serde(default)]
    pub ignore_if_gt_secs: u64,
    #[serde(default)]
    pub to_persons: Vec<String>,
    #[serde(default)]
    pub senders: Vec<MailSenderConfig>,
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct MailSenderConfig {
    #[serde(default)]
    pub smtp: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub password: String,
    /// `false` sends over plain SMTP. Port 465 always uses implicit TLS.
    #[serde(default)]
    pub tls: Option<bool>,
}

impl std::fmt::Debug for MailSenderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailSenderConfig")
            .field("smtp", &self.smtp)
            .field("port", &self.port)
            .field("sender", &self.sender)
            .field("password", &"***")
            .field("tls", &self.tls)
            .finish()
    }
}
