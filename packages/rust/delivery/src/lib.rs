//! Outbound delivery of the finished newsletter.
//!
//! [`SmtpDeliverer`] sends HTML email through an async SMTP transport.
//! [`DryRunDeliverer`] only logs, for local runs and tests.

use std::sync::Mutex;

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{info, instrument};

use newsletter_shared::{DeliverySettings, NewsletterError, Result, SmtpTls, read_secret};

/// Capability to hand a finished newsletter to its readers.
#[async_trait]
pub trait Deliverer: Send + Sync {
    async fn deliver(&self, subject: &str, body: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// SMTP
// ---------------------------------------------------------------------------

/// Sends the newsletter as a UTF-8 HTML email to a single recipient.
pub struct SmtpDeliverer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl SmtpDeliverer {
    /// Build from config, reading the SMTP password from the configured env var.
    ///
    /// The password is optional only for plaintext relays.
    pub fn from_settings(settings: &DeliverySettings) -> Result<Self> {
        let password = match settings.tls {
            SmtpTls::None => std::env::var(&settings.password_env)
                .ok()
                .filter(|p| !p.is_empty()),
            SmtpTls::Starttls | SmtpTls::Tls => {
                Some(read_secret(&settings.password_env, "SMTP password")?)
            }
        };
        Self::new(settings, password)
    }

    pub fn new(settings: &DeliverySettings, password: Option<String>) -> Result<Self> {
        let from = parse_mailbox("delivery.sender", &settings.sender)?;
        let to = parse_mailbox("delivery.recipient", &settings.recipient)?;

        let host = settings.smtp_host.as_str();
        let builder = match settings.tls {
            SmtpTls::Starttls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host),
            SmtpTls::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(host),
            SmtpTls::None => Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)),
        }
        .map_err(|e| NewsletterError::config(format!("invalid SMTP host {host:?}: {e}")))?
        .port(settings.smtp_port);

        let builder = match password {
            Some(password) => {
                let username = if settings.username.is_empty() {
                    settings.sender.clone()
                } else {
                    settings.username.clone()
                };
                builder.credentials(Credentials::new(username, password))
            }
            None => builder,
        };

        Ok(Self {
            transport: builder.build(),
            from,
            to,
        })
    }

    fn message(&self, subject: &str, body: &str) -> Result<Message> {
        Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(body.to_string())
            .map_err(|e| NewsletterError::Delivery(format!("failed to build message: {e}")))
    }
}

fn parse_mailbox(field: &str, value: &str) -> Result<Mailbox> {
    value.parse().map_err(|e| {
        NewsletterError::config(format!("{field} {value:?} is not a valid address: {e}"))
    })
}

#[async_trait]
impl Deliverer for SmtpDeliverer {
    #[instrument(skip_all, fields(recipient = %self.to))]
    async fn deliver(&self, subject: &str, body: &str) -> Result<()> {
        let message = self.message(subject, body)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| NewsletterError::Delivery(format!("SMTP send failed: {e}")))?;
        info!(recipient = %self.to, %subject, "newsletter delivered");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Dry run
// ---------------------------------------------------------------------------

/// Logs deliveries instead of sending them and remembers the subjects.
#[derive(Debug, Default)]
pub struct DryRunDeliverer {
    subjects: Mutex<Vec<String>>,
}

impl DryRunDeliverer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subjects of every delivery attempted so far, in order.
    pub fn subjects(&self) -> Vec<String> {
        self.subjects
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Deliverer for DryRunDeliverer {
    async fn deliver(&self, subject: &str, body: &str) -> Result<()> {
        info!(%subject, body_len = body.len(), "dry run: newsletter not sent");
        if let Ok(mut subjects) = self.subjects.lock() {
            subjects.push(subject.to_string());
        }
        Ok(())
    }
}
