//! SMTP mail transport via `lettre` with TLS support.
//!
//! Each send builds a transport for the sender's own credentials, so one
//! [`SmtpMailer`] serves the whole failover pool.

use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use logpush_rules::MailSender;

use crate::traits::{MailTransport, NotifyError};

/// Port that always uses implicit TLS.
const IMPLICIT_TLS_PORT: u16 = 465;

/// Delivers HTML mail through SMTP.
#[derive(Debug, Default)]
pub struct SmtpMailer {
    _private: (),
}

impl SmtpMailer {
    pub fn new() -> Self {
        Self { _private: () }
    }

    /// Build the transport for one sender.
    ///
    /// Port 465 uses implicit TLS; other ports use STARTTLS unless the sender
    /// has `tls: false`, in which case the connection is plain.
    pub fn transport(
        sender: &MailSender,
    ) -> Result<AsyncSmtpTransport<Tokio1Executor>, NotifyError> {
        let builder = if sender.port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&sender.smtp)
                .map_err(|e| NotifyError::Config(e.to_string()))?
                .port(sender.port)
        } else if sender.tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&sender.smtp)
                .map_err(|e| NotifyError::Config(e.to_string()))?
                .port(sender.port)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&sender.smtp).port(sender.port)
        };

        let credentials = Credentials::new(sender.sender.clone(), sender.password.clone());
        Ok(builder.credentials(credentials).build())
    }

    /// Build the HTML message sent to all recipients.
    pub fn message(
        sender: &MailSender,
        recipients: &[String],
        subject: &str,
        html_body: &str,
    ) -> Result<Message, NotifyError> {
        let from: Mailbox = sender
            .sender
            .parse()
            .map_err(|e: lettre::address::AddressError| NotifyError::Config(e.to_string()))?;

        if recipients.is_empty() {
            return Err(NotifyError::Config(
                "at least one recipient is required".to_string(),
            ));
        }

        let mut builder = Message::builder()
            .from(from)
            .subject(subject)
            .header(ContentType::TEXT_HTML);

        for addr in recipients {
            let to: Mailbox = addr
                .parse()
                .map_err(|e: lettre::address::AddressError| NotifyError::Config(e.to_string()))?;
            builder = builder.to(to);
        }

        builder
            .body(html_body.to_string())
            .map_err(|e| NotifyError::Smtp(e.to_string()))
    }
}

#[async_trait::async_trait]
impl MailTransport for SmtpMailer {
    async fn send(
        &self,
        sender: &MailSender,
        recipients: &[String],
        subject: &str,
        html_body: &str,
    ) -> Result<(), NotifyError> {
        let email = Self::message(sender, recipients, subject, html_body)?;
        let transport = Self::transport(sender)?;

        transport
            .send(email)
            .await
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;

        tracing::debug!(
            smtp = %sender.smtp,
            sender = %sender.sender,
            recipients = recipients.len(),
            "mail handed to SMTP server"
        );

        Ok(())
    }
}
