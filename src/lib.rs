pub mod antispam;
pub mod config;
pub mod handler;
pub mod logging;
pub mod mailer;
pub mod sanitize;
pub mod server;
pub mod submission;

#[cfg(test)]
pub(crate) mod testing;

pub use antispam::{CheckResult, SpamCheckPipeline};
pub use config::{Config, FormConfig, FormRegistry};
pub use handler::{Accepted, FormError, FormHandler};
pub use mailer::{MailComposer, RenderedMessage};
pub use submission::{RawSubmission, RequestMeta, Submission};
