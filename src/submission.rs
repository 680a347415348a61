use crate::config::FieldRoles;
use crate::sanitize::sanitize;
use std::collections::HashMap;

/// Who sent the request. Only the content classifier reads this.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMeta {
    pub client_ip: String,
    pub user_agent: String,
    pub referrer: String,
}

/// A form post as it arrived, before sanitization.
#[derive(Debug, Clone, Default)]
pub struct RawSubmission {
    pub form_id: String,
    pub pairs: Vec<(String, String)>,
    pub meta: RequestMeta,
}

/// A sanitized submission. Immutable once built; every check reads the same values.
#[derive(Debug, Clone)]
pub struct Submission {
    form_id: String,
    fields: HashMap<String, String>,
    meta: RequestMeta,
}

/// Field values looked up through a form's role table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoleValues<'a> {
    pub name: Option<&'a str>,
    pub email: Option<&'a str>,
    pub message: Option<&'a str>,
    pub honeypot: Option<&'a str>,
}

impl Submission {
    /// Sanitize every value. When a key repeats, the first value wins.
    pub fn from_raw(raw: RawSubmission) -> Self {
        let mut fields = HashMap::with_capacity(raw.pairs.len());
        for (key, value) in raw.pairs {
            fields.entry(key).or_insert_with(|| sanitize(&value));
        }
        Self {
            form_id: raw.form_id,
            fields,
            meta: raw.meta,
        }
    }

    /// Build from values that are already sanitized.
    pub fn new(
        form_id: impl Into<String>,
        fields: HashMap<String, String>,
        meta: RequestMeta,
    ) -> Self {
        Self {
            form_id: form_id.into(),
            fields,
            meta,
        }
    }

    pub fn form_id(&self) -> &str {
        &self.form_id
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn fields(&self) -> &HashMap<String, String> {
        &self.fields
    }

    pub fn meta(&self) -> &RequestMeta {
        &self.meta
    }

    /// An empty role name means the form has no such field.
    pub fn resolve(&self, roles: &FieldRoles) -> RoleValues<'_> {
        let lookup = |key: &str| {
            if key.is_empty() {
                None
            } else {
                self.field(key)
            }
        };
        RoleValues {
            name: lookup(&roles.name),
            email: lookup(&roles.email),
            message: lookup(&roles.message),
            honeypot: lookup(&roles.honeypot),
        }
    }
}
