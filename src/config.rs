use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub global: GlobalConfig,
    pub smtp: SmtpConfig,
    pub api: ApiConfig,
    pub logging: LoggingConfig,
    pub forms: BTreeMap<String, FormConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Terms checked against every form's message field, before the form's own terms
    pub blocklist: Vec<String>,
    pub host: String,
    pub port: u16,
    /// Public URL of this service, reported to the content classifier
    pub base_url: String,
    pub template_dir: String,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            blocklist: Vec::new(),
            host: "0.0.0.0".to_string(),
            port: 8080,
            base_url: "http://localhost:8080".to_string(),
            template_dir: "forms".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub tls: SmtpTls,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1025,
            user: String::new(),
            password: String::new(),
            tls: SmtpTls::None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmtpTls {
    #[default]
    None,
    StartTls,
    Wrapper,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Akismet API key; empty disables content classification
    pub akismet: String,
    pub akismet_test: bool,
    pub timeout_seconds: u64,
    pub turnstile_endpoint: String,
    pub akismet_endpoint: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            akismet: String::new(),
            akismet_test: false,
            timeout_seconds: 5,
            turnstile_endpoint: "https://challenges.cloudflare.com/turnstile/v0/siteverify"
                .to_string(),
            akismet_endpoint: "https://rest.akismet.com/1.1/comment-check".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormConfig {
    /// Filled from the key under `[forms]`
    #[serde(skip)]
    pub id: String,
    #[serde(default)]
    pub fields: FieldRoles,
    #[serde(default)]
    pub blocklist: Vec<String>,
    #[serde(default, alias = "turnstileKey")]
    pub turnstile_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
    pub mail: MailSettings,
}

/// Maps logical roles to the submitted field names of one form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldRoles {
    pub name: String,
    pub email: String,
    pub message: String,
    pub honeypot: String,
}

impl Default for FieldRoles {
    fn default() -> Self {
        Self {
            name: "name".to_string(),
            email: "email".to_string(),
            message: "message".to_string(),
            honeypot: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailSettings {
    pub sender: String,
    pub recipient: String,
    pub subject: String,
}

impl Config {
    /// Read the file, apply environment overrides and validate.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let mut config: Config = if is_yaml(path) {
            serde_yaml::from_str(&content)?
        } else {
            toml::from_str(&content)?
        };
        config.assign_form_ids();
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let mut config: Config = toml::from_str(content)?;
        config.assign_form_ids();
        Ok(config)
    }

    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        let content = if is_yaml(path) {
            serde_yaml::to_string(self)?
        } else {
            toml::to_string_pretty(self)?
        };
        std::fs::write(path, content)?;
        Ok(())
    }

    /// A starting point for `--generate-config`.
    pub fn example() -> Self {
        let mut config = Config {
            global: GlobalConfig {
                blocklist: vec!["casino".to_string(), "webcam".to_string()],
                ..Default::default()
            },
            ..Default::default()
        };
        config.forms.insert(
            "contact".to_string(),
            FormConfig {
                id: "contact".to_string(),
                fields: FieldRoles {
                    honeypot: "website".to_string(),
                    ..Default::default()
                },
                blocklist: vec!["seo services".to_string()],
                turnstile_key: String::new(),
                redirect: None,
                mail: MailSettings {
                    sender: "forms@example.com".to_string(),
                    recipient: "inbox@example.com".to_string(),
                    subject: "New submission".to_string(),
                },
            },
        );
        config
    }

    pub fn apply_env(&mut self) -> anyhow::Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Overlay values from `lookup`, which stands in for the process environment.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            self.global.port = parse_env("PORT", &port)?;
        }
        if let Some(host) = lookup("SMTP_HOST") {
            self.smtp.host = host;
        }
        if let Some(port) = lookup("SMTP_PORT") {
            self.smtp.port = parse_env("SMTP_PORT", &port)?;
        }
        if let Some(user) = lookup("SMTP_USER") {
            self.smtp.user = user;
        }
        if let Some(password) = lookup("SMTP_PASS") {
            self.smtp.password = password;
        }
        if let Some(blocklist) = lookup("BLOCKLIST") {
            self.global.blocklist = blocklist
                .split(',')
                .map(str::trim)
                .filter(|term| !term.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(key) = lookup("AKISMET_KEY") {
            self.api.akismet = key;
        }
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.global.port == 0 {
            bail!("PORT is required");
        }
        if self.smtp.host.is_empty() {
            bail!("SMTP_HOST is required");
        }
        if self.smtp.port == 0 {
            bail!("SMTP_PORT is required");
        }
        if self.api.timeout_seconds == 0 {
            bail!("api.timeout_seconds must be at least 1");
        }
        url::Url::parse(&self.global.base_url)
            .with_context(|| format!("global.base_url is not a URL: {}", self.global.base_url))?;
        if let Some(level) = &self.logging.level {
            if log::LevelFilter::from_str(level).is_err() {
                bail!("logging.level '{level}' is not a log level");
            }
        }

        for (id, form) in &self.forms {
            if form.mail.sender.is_empty() || form.mail.recipient.is_empty() {
                bail!("form '{id}' needs both mail.sender and mail.recipient");
            }
            if let Some(redirect) = &form.redirect {
                url::Url::parse(redirect)
                    .with_context(|| format!("form '{id}' redirect is not a URL: {redirect}"))?;
            }
            if form.blocklist.iter().any(String::is_empty) {
                log::warn!("form '{id}' has an empty blocklist term; it will be ignored");
            }
        }
        if self.global.blocklist.iter().any(String::is_empty) {
            log::warn!("global blocklist has an empty term; it will be ignored");
        }
        Ok(())
    }

    fn assign_form_ids(&mut self) {
        for (id, form) in self.forms.iter_mut() {
            form.id = id.clone();
        }
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml") | Some("yml")
    )
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> anyhow::Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("{key} has an invalid value: {value}"))
}

/// Read-only lookup from form identifier to its configuration, built once at start-up.
#[derive(Debug, Default)]
pub struct FormRegistry {
    forms: HashMap<String, FormConfig>,
}

impl FormRegistry {
    pub fn from_config(config: &Config) -> Self {
        Self::from_forms(config.forms.values().cloned())
    }

    pub fn from_forms<I: IntoIterator<Item = FormConfig>>(forms: I) -> Self {
        Self {
            forms: forms
                .into_iter()
                .map(|form| (form.id.clone(), form))
                .collect(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&FormConfig> {
        self.forms.get(id)
    }

    /// Form identifiers in sorted order.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.forms.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.forms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const TOML_CONTENT: &str = r#"
[global]
blocklist = ["casino", "webcam"]
port = 8080
[smtp]
host = "127.0.0.1"
port = 25
[forms]
[forms.form1]
blocklist = ["business", "website"]
turnstileKey = "turnstile_key1"
[forms.form1.fields]
name = "name1"
email = "email1"
message = "message1"
honeypot = "honeypot1"
[forms.form1.mail]
recipient = "recipient@example.com"
sender = "sender@example.com"
subject = "New submission"
[forms.form2]
blocklist = ["business", "website"]
turnstile_key = "turnstile_key1"
redirect = "https://example.com/thanks"
[forms.form2.fields]
name = "name1"
email = "email1"
message = "message1"
honeypot = "honeypot1"
[forms.form2.mail]
recipient = "recipient@example.com"
sender = "sender@example.com"
subject = "New submission"
"#;

    fn check_loaded_fields(config: &Config) {
        assert_eq!(config.global.port, 8080);
        assert_eq!(config.smtp.host, "127.0.0.1");
        assert_eq!(config.smtp.port, 25);
        assert_eq!(config.global.blocklist, vec!["casino", "webcam"]);
        assert_eq!(config.forms.len(), 2);

        for (id, form) in &config.forms {
            assert_eq!(&form.id, id);
            assert_eq!(form.blocklist, vec!["business", "website"]);
            assert_eq!(form.turnstile_key, "turnstile_key1");
            assert_eq!(form.fields.name, "name1");
            assert_eq!(form.fields.email, "email1");
            assert_eq!(form.fields.message, "message1");
            assert_eq!(form.fields.honeypot, "honeypot1");
            assert_eq!(form.mail.recipient, "recipient@example.com");
            assert_eq!(form.mail.sender, "sender@example.com");
            assert_eq!(form.mail.subject, "New submission");
        }
        assert_eq!(
            config.forms["form2"].redirect.as_deref(),
            Some("https://example.com/thanks")
        );
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(TOML_CONTENT.as_bytes()).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        check_loaded_fields(&config);
    }

    #[test]
    fn test_yaml_round_trip_keeps_forms() {
        let config = Config::from_toml_str(TOML_CONTENT).unwrap();
        let file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();

        config.to_file(file.path()).unwrap();
        let reloaded = Config::from_file(file.path()).unwrap();
        check_loaded_fields(&reloaded);
    }

    #[test]
    fn test_env_overrides_file_values() {
        let mut config = Config::from_toml_str(TOML_CONTENT).unwrap();
        let env: HashMap<&str, &str> = [
            ("PORT", "9090"),
            ("SMTP_HOST", "mail.internal"),
            ("SMTP_PORT", "587"),
            ("SMTP_USER", "user"),
            ("SMTP_PASS", "pass"),
            ("BLOCKLIST", "block1,block2"),
            ("AKISMET_KEY", "abc123"),
        ]
        .into_iter()
        .collect();

        config
            .apply_env_from(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.global.port, 9090);
        assert_eq!(config.smtp.host, "mail.internal");
        assert_eq!(config.smtp.port, 587);
        assert_eq!(config.smtp.user, "user");
        assert_eq!(config.smtp.password, "pass");
        assert_eq!(config.global.blocklist, vec!["block1", "block2"]);
        assert_eq!(config.api.akismet, "abc123");
        // Untouched by the environment
        assert_eq!(config.forms["form1"].turnstile_key, "turnstile_key1");
    }

    #[test]
    fn test_env_rejects_bad_port() {
        let mut config = Config::default();
        let result = config.apply_env_from(|key| (key == "SMTP_PORT").then(|| "smtp".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn test_defaults_apply_when_sections_missing() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.global.port, 8080);
        assert_eq!(config.smtp.host, "localhost");
        assert_eq!(config.smtp.port, 1025);
        assert_eq!(config.api.timeout_seconds, 5);
        assert!(config.api.akismet.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_required_values() {
        let mut config = Config::default();
        config.global.port = 0;
        assert_eq!(config.validate().unwrap_err().to_string(), "PORT is required");

        let mut config = Config::default();
        config.smtp.host.clear();
        assert_eq!(
            config.validate().unwrap_err().to_string(),
            "SMTP_HOST is required"
        );

        let mut config = Config::default();
        config.smtp.port = 0;
        assert_eq!(
            config.validate().unwrap_err().to_string(),
            "SMTP_PORT is required"
        );
    }

    #[test]
    fn test_validate_form_settings() {
        let mut config = Config::example();
        config.forms.get_mut("contact").unwrap().mail.recipient.clear();
        assert!(config.validate().is_err());

        let mut config = Config::example();
        config.forms.get_mut("contact").unwrap().redirect = Some("not a url".to_string());
        assert!(config.validate().is_err());

        let mut config = Config::example();
        config.logging.level = Some("chatty".to_string());
        assert!(config.validate().is_err());

        let mut config = Config::example();
        config.api.timeout_seconds = 0;
        assert_eq!(
            config.validate().unwrap_err().to_string(),
            "api.timeout_seconds must be at least 1"
        );

        assert!(Config::example().validate().is_ok());
    }

    #[test]
    fn test_registry_lookup() {
        let config = Config::from_toml_str(TOML_CONTENT).unwrap();
        let registry = FormRegistry::from_config(&config);

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.ids(), vec!["form1", "form2"]);
        assert_eq!(registry.get("form1").unwrap().id, "form1");
        assert!(registry.get("missing").is_none());
    }
}
