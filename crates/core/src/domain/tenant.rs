use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CustomerId(pub String);

impl std::fmt::Display for CustomerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One isolated customer organization: its access rules and the backend
/// endpoint the gateway forwards to. Never hard-deleted; `enabled = false`
/// is the deactivation path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: CustomerId,
    pub name: String,
    pub enabled: bool,
    pub endpoint: Option<String>,
    /// Lowercase domains without a leading `@`.
    pub allowed_domains: Vec<String>,
    /// Lowercase full addresses.
    pub allowed_emails: Vec<String>,
    /// Per-tenant admission limit; falls back to the system default when
    /// unset.
    pub rate_limit_per_minute: Option<u32>,
    pub created_at: DateTime<Utc>,
}

impl Tenant {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: CustomerId(id.into()),
            name: name.into(),
            enabled: true,
            endpoint: None,
            allowed_domains: Vec::new(),
            allowed_emails: Vec::new(),
            rate_limit_per_minute: None,
            created_at: Utc::now(),
        }
    }

    pub fn has_domain(&self, domain: &str) -> bool {
        self.allowed_domains.iter().any(|candidate| candidate == domain)
    }

    pub fn has_email(&self, email: &str) -> bool {
        self.allowed_emails.iter().any(|candidate| candidate == email)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AccessRuleError {
    #[error("invalid domain `{0}`")]
    InvalidDomain(String),
    #[error("invalid email `{0}`")]
    InvalidEmail(String),
}

/// Lowercases and strips a leading `@`; rejects empty values and values that
/// still contain `@` or whitespace.
pub fn normalize_domain(raw: &str) -> Result<String, AccessRuleError> {
    let trimmed = raw.trim().trim_start_matches('@').to_ascii_lowercase();
    if trimmed.is_empty()
        || trimmed.contains('@')
        || trimmed.chars().any(char::is_whitespace)
        || !trimmed.contains('.')
    {
        return Err(AccessRuleError::InvalidDomain(raw.to_string()));
    }
    Ok(trimmed)
}

pub fn normalize_email(raw: &str) -> Result<String, AccessRuleError> {
    let trimmed = raw.trim().to_ascii_lowercase();
    match trimmed.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(trimmed),
        _ => Err(AccessRuleError::InvalidEmail(raw.to_string())),
    }
}

/// The part after `@`, lowercased, or `None` for shapes that are not an
/// address at all.
pub fn email_domain(email: &str) -> Option<String> {
    email
        .split_once('@')
        .filter(|(local, domain)| !local.is_empty() && !domain.is_empty())
        .map(|(_, domain)| domain.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::{email_domain, normalize_domain, normalize_email, Tenant};

    #[test]
    fn new_tenant_is_enabled_with_empty_rules() {
        let tenant = Tenant::new("acme", "Acme Corp");
        assert!(tenant.enabled);
        assert!(tenant.endpoint.is_none());
        assert!(tenant.allowed_domains.is_empty());
        assert!(tenant.allowed_emails.is_empty());
    }

    #[test]
    fn domains_are_lowercased_and_stripped() {
        assert_eq!(normalize_domain("@Acme.Co.JP").unwrap(), "acme.co.jp");
        assert_eq!(normalize_domain(" example.com ").unwrap(), "example.com");
        assert!(normalize_domain("user@example.com").is_err());
        assert!(normalize_domain("").is_err());
        assert!(normalize_domain("localhost").is_err());
    }

    #[test]
    fn emails_require_local_and_domain_parts() {
        assert_eq!(normalize_email("User@Example.COM").unwrap(), "user@example.com");
        assert!(normalize_email("@example.com").is_err());
        assert!(normalize_email("user@").is_err());
        assert!(normalize_email("not-an-email").is_err());
    }

    #[test]
    fn email_domain_extracts_the_part_after_at() {
        assert_eq!(email_domain("a@acme.co.jp").as_deref(), Some("acme.co.jp"));
        assert_eq!(email_domain("no-at-sign"), None);
        assert_eq!(email_domain("@acme.co.jp"), None);
    }
}
