//! Shared types for the logpush alerting pipeline.
//!
//! - [`Config`]: the parsed configuration file and its env overrides
//! - [`LogEvent`]: one ingested log record plus payload normalization
//! - Error types for configuration and payload decoding

pub mod config;
pub mod error;
pub mod event;

pub use config::Config;
pub use error::*;
pub use event::*;
