//! Errors raised while building a rule registry or loading its configuration.

use logpush_core::ConfigError;

/// Errors that make a configuration unusable. All of them are fatal at
/// startup; during a reload they keep the previous generation active.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    /// Configuration file could not be read or parsed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Two rules normalize to the same tags and levels.
    #[error("Duplicate rule name '{name}'")]
    DuplicateName { name: String },

    /// A tag or level would make rule names ambiguous.
    #[error("Rule {field} '{value}' contains a reserved name character ('+', '@' or a lone '*')")]
    ReservedNameCharacter { field: &'static str, value: String },

    #[error("Rule '{rule}': mail channel is enabled but has no recipients")]
    MissingRecipients { rule: String },

    #[error("Rule '{rule}': mail channel is enabled but has no senders")]
    MissingSenders { rule: String },

    #[error("Rule '{rule}': mail sender #{index} is missing {field}")]
    MissingCredentials {
        rule: String,
        index: usize,
        field: &'static str,
    },

    #[error("Rule '{rule}': ding sender #{index} has an empty token")]
    EmptyToken { rule: String, index: usize },

    #[error("Rule '{rule}': flush interval {secs}s is below the minimum of {min}s")]
    FlushIntervalTooSmall { rule: String, secs: u64, min: u64 },

    #[error("Rule '{rule}': invalid matchRegex: {source}")]
    InvalidRegex {
        rule: String,
        #[source]
        source: regex::Error,
    },

    #[error("maxBatchSize must be at least 1")]
    InvalidBatchSize,

    /// Filesystem watcher error.
    #[error("Notify watcher error: {0}")]
    Notify(#[from] notify::Error),
}

/// Result alias for rule operations.
pub type Result<T> = std::result::Result<T, RuleError>;
