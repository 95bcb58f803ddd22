use thiserror::Error;

/// Credential verification failures. All map to 401 but carry distinct
/// user-facing messages so a caller knows whether to re-authenticate or fix
/// the request shape.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("authorization header is missing")]
    MissingToken,
    #[error("authorization header is malformed")]
    MalformedHeader,
    #[error("token has been revoked")]
    Revoked,
    #[error("token has expired")]
    Expired,
    #[error("token is invalid")]
    Invalid,
}

impl AuthError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::MissingToken => "Authentication required. Send a bearer token.",
            Self::MalformedHeader => "Authorization header is malformed.",
            Self::Revoked => "Session is no longer valid. Sign in again.",
            Self::Expired => "Session has expired. Sign in again.",
            Self::Invalid => "Authentication token is invalid.",
        }
    }
}

/// Request-path failures across gateway and tenant backend, with their HTTP
/// mapping. Detailed context stays in server-side logs; client messages are
/// deliberately generic.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("principal has no resolvable tenant")]
    NotAssigned,
    #[error("email is not allowed by the access policy")]
    AccessDenied,
    #[error("no routable endpoint for tenant `{customer_id}`")]
    Unroutable { customer_id: String },
    #[error("internal trust signature rejected")]
    TrustRejected,
    #[error("rate limit exceeded (remaining: {remaining})")]
    RateLimited { remaining: u32 },
    #[error("upstream request timed out")]
    UpstreamTimeout,
    #[error("upstream connection failed")]
    UpstreamUnreachable,
    #[error("invalid request: {0}")]
    BadRequest(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Auth(_) | Self::TrustRejected => 401,
            Self::NotAssigned | Self::AccessDenied => 403,
            Self::Unroutable { .. } => 404,
            Self::RateLimited { .. } => 429,
            Self::BadRequest(_) => 400,
            Self::Internal(_) => 500,
            Self::UpstreamUnreachable => 502,
            Self::UpstreamTimeout => 504,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::Auth(auth) => auth.user_message().to_string(),
            Self::NotAssigned => "This account is not linked to a customer. Contact an administrator.".to_string(),
            Self::AccessDenied => "This account is not allowed to access the service.".to_string(),
            Self::Unroutable { .. } => "Customer configuration was not found. Contact an administrator.".to_string(),
            Self::TrustRejected => "Request could not be authenticated.".to_string(),
            Self::RateLimited { remaining } => {
                format!("Request limit exceeded. (remaining: {remaining}/min)")
            }
            Self::UpstreamTimeout => "The request timed out. Try again shortly.".to_string(),
            Self::UpstreamUnreachable => "Could not reach the service. Try again shortly.".to_string(),
            Self::BadRequest(message) => message.clone(),
            Self::Internal(_) => "An unexpected internal error occurred.".to_string(),
        }
    }

    /// Stable class name for structured logs and audit queries.
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Auth(_) => "auth_failure",
            Self::NotAssigned | Self::AccessDenied => "assignment_failure",
            Self::Unroutable { .. } => "routing_failure",
            Self::TrustRejected => "trust_failure",
            Self::RateLimited { .. } => "admission_failure",
            Self::UpstreamTimeout | Self::UpstreamUnreachable => "upstream_failure",
            Self::BadRequest(_) => "bad_request",
            Self::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AuthError, GatewayError};

    #[test]
    fn auth_failures_all_map_to_unauthorized() {
        for auth in [
            AuthError::MissingToken,
            AuthError::MalformedHeader,
            AuthError::Revoked,
            AuthError::Expired,
            AuthError::Invalid,
        ] {
            assert_eq!(GatewayError::from(auth).status_code(), 401);
        }
    }

    #[test]
    fn auth_failure_kinds_have_distinct_messages() {
        let revoked = GatewayError::from(AuthError::Revoked).user_message();
        let expired = GatewayError::from(AuthError::Expired).user_message();
        let invalid = GatewayError::from(AuthError::Invalid).user_message();
        assert_ne!(revoked, expired);
        assert_ne!(expired, invalid);
        assert_ne!(revoked, invalid);
    }

    #[test]
    fn taxonomy_maps_to_expected_statuses() {
        assert_eq!(GatewayError::NotAssigned.status_code(), 403);
        assert_eq!(
            GatewayError::Unroutable { customer_id: "acme".to_string() }.status_code(),
            404
        );
        assert_eq!(GatewayError::TrustRejected.status_code(), 401);
        assert_eq!(GatewayError::RateLimited { remaining: 0 }.status_code(), 429);
        assert_eq!(GatewayError::UpstreamUnreachable.status_code(), 502);
        assert_eq!(GatewayError::UpstreamTimeout.status_code(), 504);
    }

    #[test]
    fn rate_limited_message_includes_remaining_hint() {
        let message = GatewayError::RateLimited { remaining: 3 }.user_message();
        assert!(message.contains("3"));
    }

    #[test]
    fn internal_detail_never_reaches_the_client() {
        let error = GatewayError::Internal("pool exhausted at 10.0.0.3".to_string());
        assert!(!error.user_message().contains("10.0.0.3"));
    }
}
