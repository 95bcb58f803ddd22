//! HTTP mapping for the request-path error taxonomy. Detailed context goes
//! to the server log; the wire carries the generic client message only.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{error, warn};

use relay_core::errors::GatewayError;

pub struct ApiError(pub GatewayError);

impl<E: Into<GatewayError>> From<E> for ApiError {
    fn from(error: E) -> Self {
        Self(error.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(
                event_name = "request.failed",
                error_class = self.0.error_class(),
                error = %self.0,
                status = status.as_u16(),
                "request failed"
            );
        } else {
            warn!(
                event_name = "request.rejected",
                error_class = self.0.error_class(),
                error = %self.0,
                status = status.as_u16(),
                "request rejected"
            );
        }
        (status, Json(serde_json::json!({ "error": self.0.user_message() }))).into_response()
    }
}
