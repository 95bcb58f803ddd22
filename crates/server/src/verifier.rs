//! Credential verification against the external identity provider.
//!
//! Token verification is a single authoritative external call: no retries,
//! no caching. A transient provider outage is reported as a failure, never
//! hidden.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use relay_core::errors::AuthError;
use serde::Deserialize;
use tracing::warn;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub uid: String,
    pub email: Option<String>,
}

#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, AuthError>;
}

/// Pulls the token out of an `Authorization: Bearer <token>` header value.
/// Malformed headers fail here, before any external call is made.
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let header = header.ok_or(AuthError::MissingToken)?;
    let parts: Vec<&str> = header.split(' ').collect();
    match parts.as_slice() {
        ["Bearer", token] if !token.is_empty() => Ok(token),
        _ => Err(AuthError::MalformedHeader),
    }
}

#[derive(Debug, Deserialize)]
struct ProviderIdentity {
    uid: String,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    error: String,
}

/// Verifier backed by an HTTP identity provider: the token is posted to the
/// provider's verify endpoint, which either returns the identity or an error
/// code (`revoked`, `expired`, `invalid`).
pub struct HttpCredentialVerifier {
    client: reqwest::Client,
    verify_url: String,
}

impl HttpCredentialVerifier {
    pub fn new(verify_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, verify_url: verify_url.into() })
    }
}

#[async_trait]
impl CredentialVerifier for HttpCredentialVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, AuthError> {
        let response = self
            .client
            .post(&self.verify_url)
            .json(&serde_json::json!({ "token": token }))
            .send()
            .await
            .map_err(|error| {
                warn!(
                    event_name = "auth.provider.unreachable",
                    error = %error,
                    "identity provider call failed"
                );
                AuthError::Invalid
            })?;

        if response.status().is_success() {
            let identity: ProviderIdentity = response.json().await.map_err(|error| {
                warn!(
                    event_name = "auth.provider.bad_payload",
                    error = %error,
                    "identity provider returned an undecodable identity"
                );
                AuthError::Invalid
            })?;
            return Ok(VerifiedIdentity { uid: identity.uid, email: identity.email });
        }

        let code = response
            .json::<ProviderError>()
            .await
            .map(|body| body.error)
            .unwrap_or_default();
        Err(map_provider_error(&code))
    }
}

/// Unknown provider error codes fold into `Invalid`.
fn map_provider_error(code: &str) -> AuthError {
    match code {
        "revoked" => AuthError::Revoked,
        "expired" => AuthError::Expired,
        _ => AuthError::Invalid,
    }
}

/// Fixed-table verifier for development and tests, standing in for the mock
/// identity server.
#[derive(Default)]
pub struct StaticCredentialVerifier {
    tokens: HashMap<String, Result<VerifiedIdentity, AuthError>>,
    accept_any: Option<VerifiedIdentity>,
}

impl StaticCredentialVerifier {
    pub fn with_token(
        mut self,
        token: impl Into<String>,
        uid: impl Into<String>,
        email: Option<&str>,
    ) -> Self {
        self.tokens.insert(
            token.into(),
            Ok(VerifiedIdentity { uid: uid.into(), email: email.map(str::to_string) }),
        );
        self
    }

    pub fn with_failure(mut self, token: impl Into<String>, failure: AuthError) -> Self {
        self.tokens.insert(token.into(), Err(failure));
        self
    }

    /// Dev-mode verifier: any token maps to the given identity.
    pub fn accepting_any(identity: VerifiedIdentity) -> Self {
        Self { tokens: HashMap::new(), accept_any: Some(identity) }
    }
}

#[async_trait]
impl CredentialVerifier for StaticCredentialVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, AuthError> {
        if let Some(result) = self.tokens.get(token) {
            return result.clone();
        }
        if let Some(identity) = &self.accept_any {
            return Ok(identity.clone());
        }
        Err(AuthError::Invalid)
    }
}

#[cfg(test)]
mod tests {
    use relay_core::errors::AuthError;

    use super::{
        bearer_token, map_provider_error, CredentialVerifier, StaticCredentialVerifier,
        VerifiedIdentity,
    };

    #[test]
    fn bearer_extraction_accepts_the_two_segment_shape_only() {
        assert_eq!(bearer_token(Some("Bearer abc123")).unwrap(), "abc123");
        assert_eq!(bearer_token(None), Err(AuthError::MissingToken));
        assert_eq!(bearer_token(Some("abc123")), Err(AuthError::MalformedHeader));
        assert_eq!(bearer_token(Some("Basic abc123")), Err(AuthError::MalformedHeader));
        assert_eq!(bearer_token(Some("Bearer ")), Err(AuthError::MalformedHeader));
        assert_eq!(bearer_token(Some("Bearer a b")), Err(AuthError::MalformedHeader));
        assert_eq!(bearer_token(Some("")), Err(AuthError::MalformedHeader));
    }

    #[test]
    fn provider_error_codes_map_to_distinct_failures() {
        assert_eq!(map_provider_error("revoked"), AuthError::Revoked);
        assert_eq!(map_provider_error("expired"), AuthError::Expired);
        assert_eq!(map_provider_error("invalid"), AuthError::Invalid);
        assert_eq!(map_provider_error("something-new"), AuthError::Invalid);
        assert_eq!(map_provider_error(""), AuthError::Invalid);
    }

    #[tokio::test]
    async fn static_verifier_resolves_known_tokens() {
        let verifier = StaticCredentialVerifier::default()
            .with_token("good", "user-1", Some("a@acme.co.jp"))
            .with_failure("stale", AuthError::Expired);

        let identity = verifier.verify("good").await.expect("known token verifies");
        assert_eq!(identity.uid, "user-1");
        assert_eq!(identity.email.as_deref(), Some("a@acme.co.jp"));

        assert_eq!(verifier.verify("stale").await, Err(AuthError::Expired));
        assert_eq!(verifier.verify("unknown").await, Err(AuthError::Invalid));
    }

    #[tokio::test]
    async fn accept_any_verifier_is_for_dev_only_and_always_succeeds() {
        let verifier = StaticCredentialVerifier::accepting_any(VerifiedIdentity {
            uid: "dev-user-001".to_string(),
            email: Some("dev@example.com".to_string()),
        });
        let identity = verifier.verify("whatever").await.expect("dev verifier accepts anything");
        assert_eq!(identity.uid, "dev-user-001");
    }
}
