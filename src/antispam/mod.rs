//! Spam screening for form submissions.
//!
//! Checks run in a fixed order and the first rejection ends evaluation:
//! honeypot → blocklist → CAPTCHA → content classifier.

pub mod akismet;
pub mod turnstile;

use crate::config::{ApiConfig, Config, FormConfig};
use crate::submission::{RoleValues, Submission};
use akismet::{AkismetClassifier, ContentClassifier};
use std::sync::Arc;
use std::time::Duration;
use turnstile::{CaptchaVerifier, TurnstileVerifier};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckResult {
    Pass,
    Reject(String),
}

impl CheckResult {
    pub fn is_pass(&self) -> bool {
        matches!(self, CheckResult::Pass)
    }
}

/// What a check does when the service it depends on cannot answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Let the submission through
    FailOpen,
    /// Reject the submission
    FailClosed,
}

impl FailurePolicy {
    pub fn on_unavailable(self, reason: String) -> CheckResult {
        match self {
            FailurePolicy::FailOpen => CheckResult::Pass,
            FailurePolicy::FailClosed => CheckResult::Reject(reason),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    Honeypot,
    Blocklist,
    Captcha,
    Classifier,
}

impl Check {
    pub const ORDER: [Check; 4] = [
        Check::Honeypot,
        Check::Blocklist,
        Check::Captcha,
        Check::Classifier,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Check::Honeypot => "honeypot",
            Check::Blocklist => "blocklist",
            Check::Captcha => "captcha",
            Check::Classifier => "classifier",
        }
    }

    pub fn policy(self) -> FailurePolicy {
        match self {
            Check::Classifier => FailurePolicy::FailOpen,
            Check::Honeypot | Check::Blocklist | Check::Captcha => FailurePolicy::FailClosed,
        }
    }
}

pub fn check_honeypot(value: Option<&str>) -> CheckResult {
    match value {
        Some(value) if !value.is_empty() => {
            CheckResult::Reject("honeypot field is not empty".to_string())
        }
        _ => CheckResult::Pass,
    }
}

/// Global terms are tried before form terms; the first term found in the message wins.
pub fn check_blocklist(message: Option<&str>, global: &[String], form: &[String]) -> CheckResult {
    let message = message.unwrap_or_default();
    global
        .iter()
        .chain(form.iter())
        .filter(|term| !term.is_empty())
        .find(|term| message.contains(term.as_str()))
        .map_or(CheckResult::Pass, |term| {
            CheckResult::Reject(format!("message contains blocklist term \"{term}\""))
        })
}

pub struct SpamCheckPipeline {
    verifier: Arc<dyn CaptchaVerifier>,
    classifier: Option<Arc<dyn ContentClassifier>>,
}

impl SpamCheckPipeline {
    pub fn new(
        verifier: Arc<dyn CaptchaVerifier>,
        classifier: Option<Arc<dyn ContentClassifier>>,
    ) -> Self {
        Self {
            verifier,
            classifier,
        }
    }

    /// Turnstile verification plus Akismet when a key is configured.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let api: &ApiConfig = &config.api;
        let timeout = Duration::from_secs(api.timeout_seconds);
        let verifier = Arc::new(TurnstileVerifier::new(&api.turnstile_endpoint, timeout)?);

        let classifier: Option<Arc<dyn ContentClassifier>> = if api.akismet.is_empty() {
            log::info!("No Akismet key configured, content classification disabled");
            None
        } else {
            Some(Arc::new(AkismetClassifier::new(api, &config.global.base_url)?))
        };

        Ok(Self::new(verifier, classifier))
    }

    pub async fn evaluate(
        &self,
        submission: &Submission,
        form: &FormConfig,
        global_blocklist: &[String],
    ) -> CheckResult {
        let fields = submission.resolve(&form.fields);

        for check in Check::ORDER {
            let result = self
                .run(check, submission, &fields, form, global_blocklist)
                .await;
            if let CheckResult::Reject(reason) = &result {
                log::warn!(
                    "Spam detected on form '{}' by {} check: {}",
                    form.id,
                    check.name(),
                    reason
                );
                return result;
            }
        }

        log::debug!("Submission for form '{}' passed all checks", form.id);
        CheckResult::Pass
    }

    async fn run(
        &self,
        check: Check,
        submission: &Submission,
        fields: &RoleValues<'_>,
        form: &FormConfig,
        global_blocklist: &[String],
    ) -> CheckResult {
        match check {
            Check::Honeypot => check_honeypot(fields.honeypot),
            Check::Blocklist => check_blocklist(fields.message, global_blocklist, &form.blocklist),
            Check::Captcha => self.check_captcha(submission, form).await,
            Check::Classifier => self.check_classifier(submission, fields).await,
        }
    }

    async fn check_captcha(&self, submission: &Submission, form: &FormConfig) -> CheckResult {
        if form.turnstile_key.is_empty() {
            return CheckResult::Pass;
        }

        let token = submission
            .field(turnstile::RESPONSE_FIELD)
            .unwrap_or_default();
        match self.verifier.verify(&form.turnstile_key, token).await {
            Ok(()) => CheckResult::Pass,
            Err(e) if e.is_unavailable() => {
                log::error!("CAPTCHA provider unavailable for form '{}': {e}", form.id);
                Check::Captcha.policy().on_unavailable(e.to_string())
            }
            Err(e) => CheckResult::Reject(e.to_string()),
        }
    }

    async fn check_classifier(
        &self,
        submission: &Submission,
        fields: &RoleValues<'_>,
    ) -> CheckResult {
        let Some(classifier) = &self.classifier else {
            return CheckResult::Pass;
        };

        match classifier.is_spam(submission, fields).await {
            Ok(true) => CheckResult::Reject("classified as spam".to_string()),
            Ok(false) => CheckResult::Pass,
            Err(e) => {
                let result = Check::Classifier.policy().on_unavailable(e.to_string());
                if result.is_pass() {
                    log::warn!(
                        "Content classifier unavailable (fail-open) for form '{}': {e}",
                        submission.form_id()
                    );
                }
                result
            }
        }
    }
}
