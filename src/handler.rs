use crate::antispam::{CheckResult, SpamCheckPipeline};
use crate::config::{Config, FormRegistry};
use crate::mailer::transport::{DeliveryError, MailTransport, SmtpTransport};
use crate::mailer::{ComposeError, MailComposer};
use crate::submission::{RawSubmission, Submission};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum FormError {
    #[error("unknown form '{0}'")]
    UnknownForm(String),
    /// The reason stays server-side
    #[error("spam detected: {0}")]
    Spam(String),
    #[error(transparent)]
    Compose(#[from] ComposeError),
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

/// Outcome of an accepted submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accepted {
    pub redirect: Option<String>,
}

/// Everything needed to take a submission from arrival to delivery.
pub struct FormHandler {
    registry: Arc<FormRegistry>,
    global_blocklist: Vec<String>,
    pipeline: SpamCheckPipeline,
    composer: MailComposer,
    transport: Arc<dyn MailTransport>,
}

impl FormHandler {
    pub fn new(
        registry: Arc<FormRegistry>,
        global_blocklist: Vec<String>,
        pipeline: SpamCheckPipeline,
        composer: MailComposer,
        transport: Arc<dyn MailTransport>,
    ) -> Self {
        Self {
            registry,
            global_blocklist,
            pipeline,
            composer,
            transport,
        }
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let transport = SmtpTransport::new(&config.smtp)?;
        Ok(Self::new(
            Arc::new(FormRegistry::from_config(config)),
            config.global.blocklist.clone(),
            SpamCheckPipeline::from_config(config)?,
            MailComposer::new(&config.global.template_dir),
            Arc::new(transport),
        ))
    }

    pub fn registry(&self) -> &FormRegistry {
        &self.registry
    }

    pub fn composer(&self) -> &MailComposer {
        &self.composer
    }

    /// Screen a submission without composing or sending anything.
    pub async fn screen(&self, raw: RawSubmission) -> Result<CheckResult, FormError> {
        let form = self
            .registry
            .get(&raw.form_id)
            .ok_or_else(|| FormError::UnknownForm(raw.form_id.clone()))?;
        let submission = Submission::from_raw(raw);
        Ok(self
            .pipeline
            .evaluate(&submission, form, &self.global_blocklist)
            .await)
    }

    pub async fn handle(&self, raw: RawSubmission) -> Result<Accepted, FormError> {
        // 1. Unknown forms never reach the checks
        let form = self
            .registry
            .get(&raw.form_id)
            .ok_or_else(|| FormError::UnknownForm(raw.form_id.clone()))?;

        // 2. Sanitize once; every later step reads the same values
        let submission = Submission::from_raw(raw);

        // 3. Spam checks
        if let CheckResult::Reject(reason) = self
            .pipeline
            .evaluate(&submission, form, &self.global_blocklist)
            .await
        {
            return Err(FormError::Spam(reason));
        }

        // 4. Compose and deliver
        let message = self.composer.compose(&submission, form)?;
        self.transport.send(message).await.map_err(|e| {
            log::error!("Delivery failed for form '{}': {e}", form.id);
            e
        })?;

        log::info!("Accepted submission for form '{}'", form.id);
        Ok(Accepted {
            redirect: form.redirect.clone(),
        })
    }
}
