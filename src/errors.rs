//! Errors surfaced by the relay
//!
//! Callers only ever see two kinds of failure: [`RelayError::Unauthenticated`] when no verified
//! identity is attached to the call, and [`RelayError::Internal`] for everything else. The
//! individual causes are kept apart internally as [`ForwardError`] so they can be logged and
//! tested, then collapsed at the handler boundary.
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::time::Duration;

/// Message returned to callers with no verified identity.
pub const UNAUTHENTICATED_MESSAGE: &str = "User must be authenticated to use this feature.";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    #[error("{0}")]
    Unauthenticated(String),
    #[error("{0}")]
    Internal(String),
}

impl RelayError {
    pub fn unauthenticated() -> Self {
        RelayError::Unauthenticated(UNAUTHENTICATED_MESSAGE.to_string())
    }

    /// The wire code for this error, in the callable-function style.
    pub fn code(&self) -> &'static str {
        match self {
            RelayError::Unauthenticated(_) => "UNAUTHENTICATED",
            RelayError::Internal(_) => "INTERNAL",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            RelayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": {
                "status": self.code(),
                "message": self.to_string(),
            }
        });

        (self.status(), Json(body)).into_response()
    }
}

/// Everything that can go wrong between a verified call and a decoded upstream response.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("Claude API key not configured")]
    MissingApiKey,
    #[error("invalid request payload: {0}")]
    InvalidPayload(String),
    #[error("failed to build upstream request: {0}")]
    Request(String),
    #[error("error sending request for url ({url}): {reason}")]
    Transport { url: String, reason: String },
    #[error("upstream request to {url} timed out after {}s", .timeout.as_secs())]
    Timeout { url: String, timeout: Duration },
    #[error("{status} for url: {url}")]
    Status { status: StatusCode, url: String },
    #[error("failed to read upstream response: {0}")]
    Body(String),
    #[error("invalid JSON in upstream response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl From<ForwardError> for RelayError {
    fn from(err: ForwardError) -> Self {
        RelayError::Internal(err.to_string())
    }
}
