//! The public reverse proxy.
//!
//! Every inbound request walks one pipeline: bearer auth against the
//! identity provider, tenant resolution, trust signing, endpoint lookup,
//! then a streamed forward to the tenant backend. The gateway never buffers
//! bodies; request and response both stream, so SSE responses flow through
//! chunk by chunk and a dropped client tears the upstream connection down
//! with it.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::Response;
use axum::routing::any;
use axum::Router;
use tracing::{info, warn};

use relay_core::errors::GatewayError;
use relay_core::trust::TrustSigner;

use crate::directory::{Resolution, TenantDirectory};
use crate::error::ApiError;
use crate::headers;
use crate::routing::{RouteLookup, RoutingCache};
use crate::verifier::{bearer_token, CredentialVerifier};

/// Customer id carried on forwarded requests in global-access mode, where no
/// tenant binding exists.
pub const GLOBAL_CUSTOMER_ID: &str = "global";

#[derive(Clone)]
pub struct GatewayState {
    pub verifier: Arc<dyn CredentialVerifier>,
    pub directory: Arc<TenantDirectory>,
    pub routing: Arc<RoutingCache>,
    pub signer: TrustSigner,
    pub client: reqwest::Client,
    pub upstream_timeout: Duration,
    pub fallback_endpoint: Option<String>,
}

pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/", any(proxy))
        .route("/{*path}", any(proxy))
        .with_state(state)
}

async fn proxy(State(state): State<GatewayState>, request: Request) -> Result<Response, ApiError> {
    if request.method() == Method::OPTIONS {
        return Ok(preflight()?);
    }

    let (parts, body) = request.into_parts();

    let auth_header =
        parts.headers.get(header::AUTHORIZATION).and_then(|value| value.to_str().ok());
    let token = bearer_token(auth_header).map_err(GatewayError::from)?;
    let identity = state.verifier.verify(token).await.map_err(GatewayError::from)?;

    let resolution = state
        .directory
        .resolve(&identity.uid, identity.email.as_deref())
        .await
        .map_err(|error| GatewayError::Internal(error.to_string()))?;

    let (customer_id, endpoint) = match resolution {
        Resolution::Resolved(customer_id) => {
            let lookup = state
                .routing
                .lookup(&state.directory, &customer_id)
                .await
                .map_err(|error| GatewayError::Internal(error.to_string()))?;
            match lookup {
                RouteLookup::Resolved(endpoint) => (customer_id.0, endpoint),
                RouteLookup::Unresolved => {
                    return Err(GatewayError::Unroutable { customer_id: customer_id.0 }.into())
                }
            }
        }
        Resolution::Global => {
            let endpoint = state.fallback_endpoint.clone().ok_or(GatewayError::Unroutable {
                customer_id: GLOBAL_CUSTOMER_ID.to_string(),
            })?;
            (GLOBAL_CUSTOMER_ID.to_string(), endpoint)
        }
        Resolution::NotAssigned => return Err(GatewayError::NotAssigned.into()),
    };

    let signature = state.signer.sign(&identity.uid, &customer_id);
    let url = upstream_url(&endpoint, parts.uri.path(), parts.uri.query());

    info!(
        event_name = "gateway.forward",
        user_id = %identity.uid,
        customer_id = %customer_id,
        method = %parts.method,
        path = parts.uri.path(),
        "forwarding request to tenant backend"
    );

    let mut upstream = state
        .client
        .request(parts.method.clone(), &url)
        .timeout(state.upstream_timeout)
        .header(headers::GATEWAY_VERIFIED, "true")
        .header(headers::USER_ID, &identity.uid)
        .header(headers::CUSTOMER_ID, &customer_id)
        .header(headers::GATEWAY_SIGNATURE, &signature);

    // Only a whitelist of inbound headers crosses the trust boundary. In
    // particular an attacker-supplied `X-Gateway-*` header must never reach
    // the backend.
    for name in [header::CONTENT_TYPE.as_str(), header::ACCEPT.as_str(), headers::THREAD_ID] {
        if let Some(value) = parts.headers.get(name) {
            upstream = upstream.header(name, value);
        }
    }

    let response = upstream
        .body(reqwest::Body::wrap_stream(body.into_data_stream()))
        .send()
        .await
        .map_err(map_upstream_error)?;

    Ok(stream_back(response)?)
}

fn map_upstream_error(error: reqwest::Error) -> GatewayError {
    if error.is_timeout() {
        warn!(event_name = "gateway.upstream_timeout", error = %error, "upstream timed out");
        GatewayError::UpstreamTimeout
    } else {
        warn!(event_name = "gateway.upstream_unreachable", error = %error, "upstream unreachable");
        GatewayError::UpstreamUnreachable
    }
}

/// Relays the upstream response without buffering, preserving the status and
/// the streaming-relevant headers.
fn stream_back(response: reqwest::Response) -> Result<Response, GatewayError> {
    let status = StatusCode::from_u16(response.status().as_u16())
        .unwrap_or(StatusCode::BAD_GATEWAY);

    let mut builder = Response::builder()
        .status(status)
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*");

    for name in [header::CONTENT_TYPE.as_str(), headers::THREAD_ID] {
        if let Some(value) = response.headers().get(name) {
            if let Ok(value) = HeaderValue::from_bytes(value.as_bytes()) {
                builder = builder.header(name, value);
            }
        }
    }

    builder
        .body(Body::from_stream(response.bytes_stream()))
        .map_err(|error| GatewayError::Internal(error.to_string()))
}

/// Browser preflights are answered at the edge; they carry no credentials
/// and are never proxied.
fn preflight() -> Result<Response, GatewayError> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .header(header::ACCESS_CONTROL_ALLOW_METHODS, "GET, POST, PUT, DELETE, OPTIONS")
        .header(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            "authorization, content-type, x-thread-id",
        )
        .header(header::ACCESS_CONTROL_MAX_AGE, "3600")
        .body(Body::empty())
        .map_err(|error| GatewayError::Internal(error.to_string()))
}

fn upstream_url(endpoint: &str, path: &str, query: Option<&str>) -> String {
    let base = endpoint.trim_end_matches('/');
    match query {
        Some(query) => format!("{base}{path}?{query}"),
        None => format!("{base}{path}"),
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use super::{preflight, upstream_url};

    #[test]
    fn upstream_urls_join_without_double_slashes() {
        assert_eq!(
            upstream_url("https://acme.example.com/", "/chat", None),
            "https://acme.example.com/chat"
        );
        assert_eq!(
            upstream_url("https://acme.example.com", "/chat", Some("stream=true")),
            "https://acme.example.com/chat?stream=true"
        );
        assert_eq!(upstream_url("https://acme.example.com", "/", None), "https://acme.example.com/");
    }

    #[test]
    fn preflight_is_no_content_with_cors_headers() {
        let response = preflight().expect("preflight builds");
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let headers = response.headers();
        assert_eq!(headers.get("access-control-allow-origin").unwrap(), "*");
        assert!(headers
            .get("access-control-allow-headers")
            .unwrap()
            .to_str()
            .unwrap()
            .contains("x-thread-id"));
    }
}
