//! Minimal SMTP submission transport.
//!
//! Each call opens its own session, as a mail provider may close idle
//! connections between the verify and send stages.

mod client;
mod reply;
mod stream;

use async_trait::async_trait;
use std::io;
use std::time::Duration;

pub use client::SmtpSession;
pub use reply::Reply;

use super::message::{generate_message_id, OutgoingMail};
use super::{DeliveryError, MailTransport, SentMail};
use crate::config::MailConfig;

/// SMTP error types.
#[derive(Debug, thiserror::Error)]
pub enum SmtpError {
    /// Host name could not be resolved.
    #[error("network lookup failed for {host}: {source}")]
    Lookup {
        host: String,
        #[source]
        source: io::Error,
    },

    /// No resolved address accepted the connection.
    #[error("network connection to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// A connection, greeting or socket budget expired.
    #[error("{stage} timeout after {}ms", after.as_millis())]
    Timeout { stage: &'static str, after: Duration },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// TLS handshake or configuration error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// The server refused the credentials.
    #[error("authentication failed ({code}): {message}")]
    Auth { code: u16, message: String },

    /// Server returned an error response.
    #[error("SMTP error {code}: {message}")]
    Rejected { code: u16, message: String },

    /// Unexpected or malformed response.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl SmtpError {
    pub(crate) fn rejected(reply: &Reply) -> Self {
        Self::Rejected {
            code: reply.code,
            message: reply.text(),
        }
    }

    pub(crate) fn auth(reply: &Reply) -> Self {
        Self::Auth {
            code: reply.code,
            message: reply.text(),
        }
    }
}

/// Transport that talks to the configured provider
pub struct SmtpTransport {
    config: MailConfig,
}

impl SmtpTransport {
    pub const fn new(config: MailConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl MailTransport for SmtpTransport {
    async fn verify(&self) -> Result<(), DeliveryError> {
        let session = SmtpSession::open(&self.config).await?;
        session.quit().await?;
        Ok(())
    }

    async fn send(&self, mail: &OutgoingMail) -> Result<SentMail, DeliveryError> {
        let message_id = generate_message_id(&mail.from);
        let data = mail.render(&message_id, chrono::Utc::now());

        let mut session = SmtpSession::open(&self.config).await?;
        let reply = session.send_mail(&mail.from, &mail.to, &data).await?;

        // The message is already accepted at this point
        if let Err(e) = session.quit().await {
            tracing::debug!(error = %e, "QUIT after successful send failed");
        }

        Ok(SentMail {
            message_id,
            response: reply.to_string(),
        })
    }
}
