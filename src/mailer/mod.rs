pub mod transport;

use crate::config::FormConfig;
use crate::submission::Submission;
use minijinja::{path_loader, Environment, ErrorKind, Template};
use std::path::Path;

pub const DEFAULT_TEMPLATE: &str = "default.html";

/// A fully built outbound message. `body` holds the complete message bytes, headers included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub subject: String,
    pub body: Vec<u8>,
    pub sender: String,
    pub recipient: String,
    pub reply_to: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    #[error("no template for form '{form_id}' and no {DEFAULT_TEMPLATE} fallback")]
    MissingTemplate { form_id: String },
    #[error("template error: {0}")]
    Template(String),
}

impl From<minijinja::Error> for ComposeError {
    fn from(e: minijinja::Error) -> Self {
        ComposeError::Template(e.to_string())
    }
}

/// Renders per-form HTML templates from a directory: `<form id>.html`, else `default.html`.
pub struct MailComposer {
    env: Environment<'static>,
}

impl MailComposer {
    pub fn new<P: AsRef<Path>>(template_dir: P) -> Self {
        let mut env = Environment::new();
        env.set_loader(path_loader(template_dir.as_ref().to_path_buf()));
        Self { env }
    }

    /// The template a form's mail would be rendered with.
    pub fn template_for(&self, form_id: &str) -> Result<Template<'_, '_>, ComposeError> {
        match self.env.get_template(&format!("{form_id}.html")) {
            Ok(template) => Ok(template),
            Err(e) if e.kind() == ErrorKind::TemplateNotFound => {
                log::debug!("No template for form '{form_id}', using {DEFAULT_TEMPLATE}");
                self.env.get_template(DEFAULT_TEMPLATE).map_err(|e| {
                    if e.kind() == ErrorKind::TemplateNotFound {
                        ComposeError::MissingTemplate {
                            form_id: form_id.to_string(),
                        }
                    } else {
                        e.into()
                    }
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn compose(
        &self,
        submission: &Submission,
        form: &FormConfig,
    ) -> Result<RenderedMessage, ComposeError> {
        let rendered = self.template_for(&form.id)?.render(submission.fields())?;

        let sender = header_value(&form.mail.sender);
        let recipient = header_value(&form.mail.recipient);
        let subject = header_value(&format!("{} - {}", form.mail.subject, form.id));
        let reply_to = submission
            .resolve(&form.fields)
            .email
            .map(header_value)
            .unwrap_or_default();

        let mut message = String::new();
        message.push_str(&format!("From: <{sender}>\r\n"));
        message.push_str(&format!("To: <{recipient}>\r\n"));
        message.push_str(&format!("Subject: {subject}\r\n"));
        if !reply_to.is_empty() {
            message.push_str(&format!("Reply-To: <{reply_to}>\r\n"));
        }
        message.push_str("MIME-version: 1.0;\r\nContent-Type: text/html; charset=\"UTF-8\";\r\n\r\n");
        message.push_str(&rendered);

        Ok(RenderedMessage {
            subject,
            body: message.into_bytes(),
            sender,
            recipient,
            reply_to,
        })
    }
}

/// Header values must stay on one line.
fn header_value(value: &str) -> String {
    value.chars().filter(|c| *c != '\r' && *c != '\n').collect()
}
