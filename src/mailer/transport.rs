use super::RenderedMessage;
use crate::config::{SmtpConfig, SmtpTls};
use async_trait::async_trait;
use lettre::address::{Address, Envelope};
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use std::time::Duration;

/// Hands a finished message to a mail relay.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, message: RenderedMessage) -> Result<(), DeliveryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("invalid address '{address}': {reason}")]
    Address { address: String, reason: String },
    #[error("SMTP setup failed: {0}")]
    Setup(String),
    #[error("SMTP delivery failed: {0}")]
    Smtp(String),
}

pub struct SmtpTransport {
    inner: AsyncSmtpTransport<Tokio1Executor>,
    relay: String,
}

impl SmtpTransport {
    pub fn new(config: &SmtpConfig) -> Result<Self, DeliveryError> {
        let builder = match config.tls {
            SmtpTls::None => {
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(config.host.as_str())
            }
            SmtpTls::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                    .map_err(|e| DeliveryError::Setup(e.to_string()))?
            }
            SmtpTls::Wrapper => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| DeliveryError::Setup(e.to_string()))?,
        };

        let mut builder = builder
            .port(config.port)
            .timeout(Some(Duration::from_secs(30)));
        if !config.user.is_empty() {
            builder = builder
                .credentials(Credentials::new(
                    config.user.clone(),
                    config.password.clone(),
                ))
                .authentication(vec![Mechanism::Plain]);
        }

        Ok(Self {
            inner: builder.build(),
            relay: format!("{}:{}", config.host, config.port),
        })
    }
}

fn parse_address(address: &str) -> Result<Address, DeliveryError> {
    address.parse().map_err(|e: lettre::address::AddressError| DeliveryError::Address {
        address: address.to_string(),
        reason: e.to_string(),
    })
}

#[async_trait]
impl MailTransport for SmtpTransport {
    async fn send(&self, message: RenderedMessage) -> Result<(), DeliveryError> {
        let from = parse_address(&message.sender)?;
        let to = parse_address(&message.recipient)?;
        let envelope =
            Envelope::new(Some(from), vec![to]).map_err(|e| DeliveryError::Setup(e.to_string()))?;

        self.inner
            .send_raw(&envelope, &message.body)
            .await
            .map_err(|e| DeliveryError::Smtp(e.to_string()))?;

        log::info!(
            "Delivered '{}' to {} via {}",
            message.subject,
            message.recipient,
            self.relay
        );
        Ok(())
    }
}
