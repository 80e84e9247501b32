//! Error type for admission handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use kube::core::admission::SerializePatchError;

/// Result type for webhook operations
pub type Result<T> = std::result::Result<T, WebhookError>;

/// Error type for webhook operations
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// The admission review or the pod inside it could not be decoded
    #[error("could not decode admission request: {0}")]
    Decode(String),

    /// A targeted container has no command for the op CLI to wrap
    #[error("not attaching op to the container {container}: the podspec does not define a command")]
    MissingCommand {
        /// Name of the container without a command
        container: String,
    },

    /// The admission response or patch could not be serialized
    #[error("could not encode response: {0}")]
    Encode(String),

    /// The request body was empty
    #[error("empty body")]
    EmptyBody,

    /// The request did not declare a JSON body
    #[error("invalid Content-Type {0:?}, expect `application/json`")]
    UnsupportedMediaType(String),
}

impl WebhookError {
    /// Create a decode error from any displayable cause
    pub fn decode(cause: impl std::fmt::Display) -> Self {
        Self::Decode(cause.to_string())
    }

    /// Create a missing-command error for the named container
    pub fn missing_command(container: impl Into<String>) -> Self {
        Self::MissingCommand {
            container: container.into(),
        }
    }

    /// HTTP status used when this error escapes the admission response body
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::EmptyBody | WebhookError::Decode(_) => StatusCode::BAD_REQUEST,
            WebhookError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            WebhookError::MissingCommand { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            WebhookError::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<serde_json::Error> for WebhookError {
    fn from(e: serde_json::Error) -> Self {
        Self::Encode(e.to_string())
    }
}

impl From<SerializePatchError> for WebhookError {
    fn from(e: SerializePatchError) -> Self {
        Self::Encode(e.to_string())
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // K8s-style Status body
        let body = serde_json::json!({
            "kind": "Status",
            "apiVersion": "v1",
            "status": "Failure",
            "message": self.to_string(),
            "code": status.as_u16()
        });

        (status, Json(body)).into_response()
    }
}
