//! The tenant backend surface: the chat endpoints a routed tenant instance
//! exposes behind the gateway.
//!
//! Trust is dual-mode. A request carrying `X-Gateway-Verified: true` must
//! prove it came from the gateway with a valid signature before its identity
//! headers are believed; a request without the marker is treated as direct
//! and authenticated from scratch. The same binary therefore works behind
//! the gateway and standalone.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info, warn};

use relay_agent::input::{generate_thread_id, validate_message, validate_thread_id};
use relay_agent::registry::AgentRegistry;
use relay_agent::runtime::AgentRuntime;
use relay_core::domain::principal::Principal;
use relay_core::domain::tenant::{CustomerId, Tenant};
use relay_core::errors::GatewayError;
use relay_core::trust::TrustSigner;

use crate::admission::AdmissionController;
use crate::directory::{Resolution, TenantDirectory};
use crate::error::ApiError;
use crate::headers;
use crate::verifier::{bearer_token, CredentialVerifier};

#[derive(Clone)]
pub struct BackendState {
    pub verifier: Arc<dyn CredentialVerifier>,
    pub directory: Arc<TenantDirectory>,
    pub signer: TrustSigner,
    pub admission: Arc<AdmissionController>,
    pub agents: Arc<AgentRegistry>,
}

pub fn router(state: BackendState) -> Router {
    Router::new()
        .route("/chat", post(chat))
        .route("/chat/sync", post(chat_sync))
        .route("/agents", get(list_agents))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
    thread_id: Option<String>,
    agent: Option<String>,
}

async fn authenticate(
    state: &BackendState,
    headers: &HeaderMap,
) -> Result<Principal, GatewayError> {
    let gateway_verified = headers
        .get(headers::GATEWAY_VERIFIED)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.eq_ignore_ascii_case("true"));

    if gateway_verified {
        let uid = header_str(headers, headers::USER_ID);
        let customer_id = header_str(headers, headers::CUSTOMER_ID);
        let signature = header_str(headers, headers::GATEWAY_SIGNATURE);

        let Some(uid) = uid.filter(|uid| !uid.is_empty()) else {
            warn!(
                event_name = "backend.trust.missing_identity",
                "gateway marker present without a user id"
            );
            return Err(GatewayError::TrustRejected);
        };
        let customer_id = customer_id.unwrap_or_default();

        if !state.signer.check(uid, customer_id, signature.unwrap_or_default()) {
            warn!(
                event_name = "backend.trust.forgery_suspected",
                user_id = uid,
                customer_id,
                "gateway signature did not verify, possible header forgery"
            );
            return Err(GatewayError::TrustRejected);
        }

        let customer_id = match customer_id {
            "" | crate::gateway::GLOBAL_CUSTOMER_ID => None,
            bound => Some(CustomerId(bound.to_string())),
        };
        return Ok(Principal { uid: uid.to_string(), email: None, customer_id });
    }

    // Direct request: the backend does the gateway's work itself.
    let auth_header = headers.get(header::AUTHORIZATION).and_then(|value| value.to_str().ok());
    let token = bearer_token(auth_header)?;
    let identity = state.verifier.verify(token).await?;
    let resolution = state
        .directory
        .resolve(&identity.uid, identity.email.as_deref())
        .await
        .map_err(|error| GatewayError::Internal(error.to_string()))?;

    match resolution {
        Resolution::Resolved(customer_id) => Ok(Principal {
            uid: identity.uid,
            email: identity.email,
            customer_id: Some(customer_id),
        }),
        Resolution::Global => Ok(Principal::unresolved(identity.uid, identity.email)),
        Resolution::NotAssigned => Err(GatewayError::NotAssigned),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Tenant record for the caller, used only for the rate limit override. A
/// store error here degrades to the default limit instead of failing the
/// request.
async fn tenant_for(state: &BackendState, caller: &Principal) -> Option<Tenant> {
    let customer_id = caller.customer_id.as_ref()?;
    match state.directory.get_tenant(customer_id).await {
        Ok(tenant) => tenant,
        Err(error) => {
            warn!(
                event_name = "backend.tenant_lookup_failed",
                customer_id = %customer_id,
                error = %error,
                "falling back to the default rate limit"
            );
            None
        }
    }
}

struct PreparedChat {
    uid: String,
    message: String,
    thread_id: String,
    agent: Arc<dyn AgentRuntime>,
}

/// Shared front half of both chat endpoints: trust, admission, input
/// validation and agent selection.
async fn prepare_chat(
    state: &BackendState,
    http_headers: &HeaderMap,
    request: ChatRequest,
) -> Result<PreparedChat, GatewayError> {
    let caller = authenticate(state, http_headers).await?;

    let tenant = tenant_for(state, &caller).await;
    let decision = state.admission.admit(&caller.uid, tenant.as_ref()).await;
    if !decision.allowed {
        return Err(GatewayError::RateLimited { remaining: decision.remaining });
    }

    let message = validate_message(&request.message)
        .map_err(|error| GatewayError::BadRequest(error.to_string()))?
        .to_string();
    let thread_id = match request.thread_id {
        Some(thread_id) => {
            validate_thread_id(&thread_id)
                .map_err(|error| GatewayError::BadRequest(error.to_string()))?;
            thread_id
        }
        None => generate_thread_id(&caller.uid),
    };

    let agent_name = request.agent.as_deref().unwrap_or(state.agents.default_name());
    let agent = state
        .agents
        .get(agent_name)
        .ok_or_else(|| GatewayError::BadRequest(format!("unknown agent `{agent_name}`")))?;

    info!(
        event_name = "backend.chat.accepted",
        user_id = %caller.uid,
        customer_id = caller
            .customer_id
            .as_ref()
            .map_or(crate::gateway::GLOBAL_CUSTOMER_ID, |id| id.0.as_str()),
        thread_id = %thread_id,
        agent = agent_name,
        "chat request admitted"
    );

    Ok(PreparedChat { uid: caller.uid, message, thread_id, agent })
}

fn sse_event(payload: &str) -> String {
    format!("data: {payload}\n\n")
}

async fn chat(
    State(state): State<BackendState>,
    http_headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    let prepared = prepare_chat(&state, &http_headers, request).await?;
    let PreparedChat { uid, message, thread_id, agent } = prepared;

    let (tx, rx) = mpsc::channel::<Result<String, Infallible>>(16);
    let producer_thread_id = thread_id.clone();
    tokio::spawn(async move {
        let mut stream = match agent.run(&message, &producer_thread_id).await {
            Ok(stream) => stream,
            Err(source) => {
                error!(
                    event_name = "backend.agent.start_failed",
                    user_id = %uid,
                    thread_id = %producer_thread_id,
                    error = %source,
                    "agent failed to start"
                );
                let _ = tx.send(Ok(sse_event("[ERROR] agent failed to respond"))).await;
                return;
            }
        };

        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(chunk) => {
                    // A failed send means the client went away; dropping the
                    // stream cancels the agent run.
                    if tx.send(Ok(sse_event(&chunk))).await.is_err() {
                        info!(
                            event_name = "backend.chat.client_disconnected",
                            thread_id = %producer_thread_id,
                            "client dropped mid-stream"
                        );
                        return;
                    }
                }
                Err(source) => {
                    error!(
                        event_name = "backend.agent.stream_failed",
                        user_id = %uid,
                        thread_id = %producer_thread_id,
                        error = %source,
                        "agent stream failed mid-response"
                    );
                    let _ = tx.send(Ok(sse_event("[ERROR] agent failed to respond"))).await;
                    return;
                }
            }
        }
        let _ = tx.send(Ok(sse_event("[DONE]"))).await;
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .header(headers::THREAD_ID, &thread_id)
        .body(Body::from_stream(ReceiverStream::new(rx)))
        .map_err(|error| ApiError(GatewayError::Internal(error.to_string())))
}

async fn chat_sync(
    State(state): State<BackendState>,
    http_headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    let prepared = prepare_chat(&state, &http_headers, request).await?;

    let response = prepared
        .agent
        .run_sync(&prepared.message, &prepared.thread_id)
        .await
        .map_err(|source| {
            error!(
                event_name = "backend.agent.sync_failed",
                user_id = %prepared.uid,
                thread_id = %prepared.thread_id,
                error = %source,
                "agent failed to produce a response"
            );
            GatewayError::Internal(source.to_string())
        })?;

    let body = serde_json::json!({
        "response": response,
        "thread_id": prepared.thread_id,
    });
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .header(headers::THREAD_ID, &prepared.thread_id)
        .body(Body::from(body.to_string()))
        .map_err(|error| ApiError(GatewayError::Internal(error.to_string())))
}

async fn list_agents(
    State(state): State<BackendState>,
    http_headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    authenticate(&state, &http_headers).await?;
    Ok(Json(serde_json::json!({
        "agents": state.agents.names(),
        "default": state.agents.default_name(),
    })))
}
