//! Alert rule registry, matcher and configuration loader.
//!
//! This crate provides:
//! - [`Rule`] with its chat and mail channels (the mail channel owns the
//!   pending queue and round-robin cursor)
//! - [`RuleRegistry`]: normalization, name derivation and validation
//! - [`matcher`]: tag/level predicate and ignore-list suppression
//! - [`loader::ConfigLoader`]: file loading with hot-reload via `notify`

pub mod error;
pub mod loader;
pub mod matcher;
pub mod registry;
pub mod rule;

pub use error::{Result, RuleError};
pub use registry::RuleRegistry;
pub use rule::{ChatChannel, MailBatch, MailChannel, MailSender, Rule};
