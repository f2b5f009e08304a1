//! Alert delivery for matched log events.
//!
//! This crate provides:
//! - `MailTransport`, `PushSink` and `PushClient` traits at the delivery seams
//! - SMTP delivery via `lettre` and DingTalk robot push queues
//! - Minijinja rendering of events into HTML and plain text
//! - Chat dispatch, mail aggregation with sender failover, and the engine
//!   that fans matched events out to both

pub mod chat;
pub mod dingtalk;
pub mod dispatcher;
pub mod email;
pub mod limiter;
pub mod mail;
pub mod templating;
pub mod traits;

#[cfg(test)]
pub(crate) mod test_support;

pub use chat::{ChatDispatcher, ChatOutcome};
pub use dingtalk::{DingClient, PushQueue, PushRegistry};
pub use dispatcher::{AlertEngine, EngineSettings};
pub use email::SmtpMailer;
pub use mail::{FlushOutcome, MailAggregator};
pub use templating::{TemplateRenderer, Variant};
pub use traits::{MailTransport, NotifyError, PushClient, PushMessage, PushSink};
