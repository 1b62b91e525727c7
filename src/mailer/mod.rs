//! Mail dispatch module
//!
//! Delivers one message per request through a [`MailTransport`], in two
//! stages: verify that the provider accepts a session, then send. Each stage
//! runs under its own deadline; an expired deadline drops the stage's future,
//! which closes whatever connection it held.

mod error;
mod message;
mod smtp;

use async_trait::async_trait;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub use error::DeliveryError;
pub use message::OutgoingMail;
pub use smtp::SmtpTransport;

use crate::config::MailConfig;

/// Provider accepted the message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMail {
    pub message_id: String,
    /// Final provider reply, e.g. `250 2.0.0 OK`
    pub response: String,
}

/// Outcome handed back to the router
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryResult {
    pub success: bool,
    pub message_id: Option<String>,
    pub provider_response: Option<String>,
}

/// Outbound mail transport
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Opens a session with the provider, authenticates and closes it.
    async fn verify(&self) -> Result<(), DeliveryError>;

    /// Submits one message.
    async fn send(&self, mail: &OutgoingMail) -> Result<SentMail, DeliveryError>;
}

/// Sends form submissions from the configured sender to the configured
/// recipient.
pub struct MailDispatcher {
    transport: Arc<dyn MailTransport>,
    from: String,
    to: String,
    verify_timeout: Duration,
    send_timeout: Duration,
}

impl MailDispatcher {
    pub fn new(config: &MailConfig, transport: Arc<dyn MailTransport>) -> Self {
        Self {
            transport,
            from: config.from.clone(),
            to: config.to.clone(),
            verify_timeout: Duration::from_millis(config.verify_timeout_ms),
            send_timeout: Duration::from_millis(config.send_timeout_ms),
        }
    }

    pub async fn dispatch(&self, subject: &str, message: &str) -> Result<DeliveryResult, DeliveryError> {
        tracing::info!("Verifying mail provider connection");
        with_deadline(
            "SMTP verification timeout",
            self.verify_timeout,
            self.transport.verify(),
        )
        .await?;
        tracing::info!("Mail provider connection verified");

        let mail = OutgoingMail::new(&self.from, &self.to, subject, message);
        tracing::info!(from = %mail.from, to = %mail.to, subject = %mail.subject, "Sending email");

        let sent = with_deadline(
            "Email sending timeout",
            self.send_timeout,
            self.transport.send(&mail),
        )
        .await?;
        tracing::info!(
            message_id = %sent.message_id,
            response = %sent.response,
            "Email sent successfully"
        );

        Ok(DeliveryResult {
            success: true,
            message_id: Some(sent.message_id),
            provider_response: Some(sent.response),
        })
    }
}

async fn with_deadline<T, F>(description: &str, budget: Duration, fut: F) -> Result<T, DeliveryError>
where
    F: Future<Output = Result<T, DeliveryError>>,
{
    match tokio::time::timeout(budget, fut).await {
        Ok(result) => result,
        Err(_) => Err(DeliveryError::deadline(description, budget)),
    }
}

#[cfg(test)]
pub mod testing {
    //! In-memory transports for tests.

    use super::{DeliveryError, MailTransport, OutgoingMail, SentMail};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records messages and replies with a canned outcome
    pub struct FakeTransport {
        pub verify_delay: Duration,
        pub send_delay: Duration,
        pub failure: Option<DeliveryError>,
        pub panic_on_send: bool,
        pub sent: Mutex<Vec<OutgoingMail>>,
    }

    impl FakeTransport {
        pub fn accepting() -> Self {
            Self {
                verify_delay: Duration::ZERO,
                send_delay: Duration::ZERO,
                failure: None,
                panic_on_send: false,
                sent: Mutex::new(Vec::new()),
            }
        }

        pub fn failing(failure: DeliveryError) -> Self {
            Self {
                failure: Some(failure),
                ..Self::accepting()
            }
        }
    }

    #[async_trait]
    impl MailTransport for FakeTransport {
        async fn verify(&self) -> Result<(), DeliveryError> {
            tokio::time::sleep(self.verify_delay).await;
            Ok(())
        }

        async fn send(&self, mail: &OutgoingMail) -> Result<SentMail, DeliveryError> {
            tokio::time::sleep(self.send_delay).await;
            assert!(!self.panic_on_send, "transport exploded");
            if let Some(failure) = &self.failure {
                return Err(failure.clone());
            }
            let mut sent = self.sent.lock().unwrap();
            sent.push(mail.clone());
            Ok(SentMail {
                message_id: format!("<fake-{}@example.com>", sent.len()),
                response: "250 2.0.0 OK".to_string(),
            })
        }
    }
}
