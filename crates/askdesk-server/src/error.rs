//! Mapping of domain errors to HTTP responses.

use askdesk_core::Error;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{debug, error};

const PROVIDER_MESSAGE: &str =
    "The assistant is temporarily unavailable. Please try again shortly.";
const INTERNAL_MESSAGE: &str = "Something went wrong on our side.";

/// Error returned by every handler. Bodies have the shape
/// `{ "error": { "code": "...", "message": "..." } }`.
#[derive(Debug)]
pub enum ApiError {
    Domain(Error),
    RateLimited { retry_after_secs: u64 },
    Unauthorized,
    /// The endpoint is disabled by configuration.
    Disabled(&'static str),
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError::Domain(e)
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

fn body(status: StatusCode, code: &str, message: &str) -> Response {
    (status, Json(json!({ "error": { "code": code, "message": message } }))).into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Domain(e) => {
                let code = e.code();
                match &e {
                    Error::Validation(msg) => body(StatusCode::BAD_REQUEST, code, msg),
                    Error::NotFound(msg) => body(StatusCode::NOT_FOUND, code, msg),
                    Error::Provider(_) | Error::ProviderUnavailable(_) | Error::Http(_) => {
                        error!("Provider error: {}", e);
                        body(StatusCode::BAD_GATEWAY, code, PROVIDER_MESSAGE)
                    }
                    _ => {
                        error!("Internal error: {}", e);
                        body(StatusCode::INTERNAL_SERVER_ERROR, code, INTERNAL_MESSAGE)
                    }
                }
            }
            ApiError::RateLimited { retry_after_secs } => {
                debug!("Responding 429 (retry after {}s)", retry_after_secs);
                let mut response = (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(json!({
                        "error": {
                            "code": "RATE_LIMITED",
                            "message": "Too many messages. Please wait a moment and try again.",
                        },
                        "retryAfter": retry_after_secs,
                    })),
                )
                    .into_response();
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
                response
            }
            ApiError::Unauthorized => {
                body(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "invalid sync secret")
            }
            ApiError::Disabled(what) => body(
                StatusCode::SERVICE_UNAVAILABLE,
                "NOT_CONFIGURED",
                &format!("{} is not configured", what),
            ),
        }
    }
}
