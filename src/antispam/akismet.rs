use crate::config::ApiConfig;
use crate::submission::{RoleValues, Submission};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Advisory spam scoring by a third-party service.
#[async_trait]
pub trait ContentClassifier: Send + Sync {
    async fn is_spam(
        &self,
        submission: &Submission,
        fields: &RoleValues<'_>,
    ) -> Result<bool, ClassifyError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("{0}")]
    Transport(String),
    #[error("HTTP {0}")]
    Status(u16),
    #[error("unexpected classifier answer '{body}' ({help})")]
    Unexpected { body: String, help: String },
}

/// Akismet `comment-check` client.
pub struct AkismetClassifier {
    client: Client,
    endpoint: String,
    api_key: String,
    blog: String,
    is_test: bool,
}

impl AkismetClassifier {
    pub fn new(api: &ApiConfig, blog: &str) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(api.timeout_seconds))
            .user_agent(concat!("formgate/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            endpoint: api.akismet_endpoint.clone(),
            api_key: api.akismet.clone(),
            blog: blog.to_string(),
            is_test: api.akismet_test,
        })
    }
}

#[async_trait]
impl ContentClassifier for AkismetClassifier {
    async fn is_spam(
        &self,
        submission: &Submission,
        fields: &RoleValues<'_>,
    ) -> Result<bool, ClassifyError> {
        let meta = submission.meta();
        let comment_date = chrono::Utc::now().to_rfc3339();
        let mut params: Vec<(&str, &str)> = vec![
            ("api_key", self.api_key.as_str()),
            ("blog", self.blog.as_str()),
            ("user_ip", meta.client_ip.as_str()),
            ("user_agent", meta.user_agent.as_str()),
            ("referrer", meta.referrer.as_str()),
            ("comment_type", "contact-form"),
            ("comment_author", fields.name.unwrap_or_default()),
            ("comment_author_email", fields.email.unwrap_or_default()),
            ("comment_content", fields.message.unwrap_or_default()),
            ("comment_date_gmt", comment_date.as_str()),
        ];
        if self.is_test {
            params.push(("is_test", "true"));
        }

        let response = self
            .client
            .post(&self.endpoint)
            .form(&params)
            .send()
            .await
            .map_err(|e| ClassifyError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ClassifyError::Status(response.status().as_u16()));
        }

        let help = response
            .headers()
            .get("x-akismet-debug-help")
            .and_then(|value| value.to_str().ok())
            .unwrap_or("no debug help")
            .to_string();
        let body = response
            .text()
            .await
            .map_err(|e| ClassifyError::Transport(e.to_string()))?;

        match body.trim() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(ClassifyError::Unexpected {
                body: other.to_string(),
                help,
            }),
        }
    }
}
