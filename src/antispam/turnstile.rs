use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Submission field the Turnstile widget writes its token into.
pub const RESPONSE_FIELD: &str = "cf-turnstile-response";

/// Server-side confirmation that a CAPTCHA token was solved by a human.
#[async_trait]
pub trait CaptchaVerifier: Send + Sync {
    /// `Ok(())` only when the provider reports success.
    async fn verify(&self, secret: &str, token: &str) -> Result<(), VerifyError>;
}

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("{0}")]
    Transport(String),
    #[error("HTTP {0}")]
    Status(u16),
    #[error("malformed verification response: {0}")]
    Decode(String),
    /// Provider error codes, passed through unmodified
    #[error("{}", .0.join(", "))]
    Rejected(Vec<String>),
    #[error("validation failed")]
    ValidationFailed,
}

impl VerifyError {
    /// The provider could not give an answer, as opposed to answering "no".
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            VerifyError::Transport(_) | VerifyError::Status(_) | VerifyError::Decode(_)
        )
    }
}

#[derive(Debug, Serialize)]
struct SiteVerifyRequest<'a> {
    secret: &'a str,
    response: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
#[allow(dead_code)]
struct SiteVerifyResponse {
    success: bool,
    #[serde(rename = "error-codes")]
    error_codes: Vec<String>,
    challenge_ts: String,
    hostname: String,
    action: String,
    cdata: String,
}

/// Cloudflare Turnstile site-verify client.
pub struct TurnstileVerifier {
    client: Client,
    endpoint: String,
}

impl TurnstileVerifier {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("formgate/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl CaptchaVerifier for TurnstileVerifier {
    async fn verify(&self, secret: &str, token: &str) -> Result<(), VerifyError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&SiteVerifyRequest {
                secret,
                response: token,
            })
            .send()
            .await
            .map_err(|e| VerifyError::Transport(e.to_string()))?;

        if response.status() != StatusCode::OK {
            return Err(VerifyError::Status(response.status().as_u16()));
        }

        let outcome: SiteVerifyResponse = response
            .json()
            .await
            .map_err(|e| VerifyError::Decode(e.to_string()))?;
        log::debug!(
            "Turnstile answered success={} hostname='{}' action='{}'",
            outcome.success,
            outcome.hostname,
            outcome.action
        );

        if outcome.success {
            Ok(())
        } else if outcome.error_codes.is_empty() {
            Err(VerifyError::ValidationFailed)
        } else {
            Err(VerifyError::Rejected(outcome.error_codes))
        }
    }
}
