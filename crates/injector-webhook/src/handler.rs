//! AdmissionReview HTTP adapter
//!
//! Decodes the review sent by the API server, runs the [`Mutator`] and encodes
//! the answer. The injector never blocks admission: every decodable request is
//! answered with `allowed: true`, failures travel in `status.message` and in a
//! client-visible warning.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header::CONTENT_TYPE, HeaderMap},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use injector_common::InjectorConfig;
use k8s_openapi::api::core::v1::Pod;
use kube::core::{
    admission::{AdmissionRequest, AdmissionResponse, AdmissionReview},
    DynamicObject, Status,
};
use tracing::{debug, error, info, warn};

use crate::error::{Result, WebhookError};
use crate::mutate::{Decision, Mutator};
use crate::patch::into_patch;

/// Status reason attached to admitted-but-not-injected responses
pub const INJECTION_FAILED_REASON: &str = "InjectionFailed";

/// Media type the API server uses for AdmissionReview bodies
const JSON_MEDIA_TYPE: &str = "application/json";

/// Shared state for webhook handlers
#[derive(Debug, Clone)]
pub struct WebhookState {
    /// Policy evaluator and patch builder
    pub mutator: Mutator,
}

impl WebhookState {
    /// Create webhook state from validated configuration
    pub fn new(config: InjectorConfig) -> Self {
        Self {
            mutator: Mutator::new(config),
        }
    }
}

/// Create the webhook router
///
/// - POST /mutate, POST /mutate/pods - mutate Pods
/// - GET /healthz - liveness
pub fn webhook_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route("/mutate", post(mutate_handler))
        .route("/mutate/pods", post(mutate_handler))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(state)
}

/// Handle a mutating AdmissionReview for a Pod
pub async fn mutate_handler(
    State(state): State<Arc<WebhookState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    if body.is_empty() {
        error!("Received empty admission request body");
        return Err(WebhookError::EmptyBody);
    }
    ensure_json(&headers)?;

    let review = review(&state.mutator, &body)?;
    let encoded = serde_json::to_vec(&review).inspect_err(|e| {
        error!(error = %e, "Failed to encode admission response");
    })?;

    Ok(([(CONTENT_TYPE, JSON_MEDIA_TYPE)], encoded).into_response())
}

/// Reject anything not declared as JSON (charset parameters are tolerated)
fn ensure_json(headers: &HeaderMap) -> Result<()> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let media_type = content_type.split(';').next().unwrap_or_default().trim();

    if media_type.eq_ignore_ascii_case(JSON_MEDIA_TYPE) {
        Ok(())
    } else {
        error!(content_type = %content_type, "Unexpected Content-Type, expect application/json");
        Err(WebhookError::UnsupportedMediaType(content_type.to_string()))
    }
}

/// Answer one raw AdmissionReview body
///
/// Only encoding failures escape as `Err`; everything else, including an
/// undecodable body, becomes an admission response.
pub fn review(mutator: &Mutator, body: &[u8]) -> Result<AdmissionReview<DynamicObject>> {
    let review: AdmissionReview<DynamicObject> = match serde_json::from_slice(body) {
        Ok(review) => review,
        Err(e) => {
            error!(error = %e, "Failed to decode admission review");
            return Ok(undecodable(WebhookError::decode(e)).into_review());
        }
    };

    let request: AdmissionRequest<DynamicObject> = match review.try_into() {
        Ok(request) => request,
        Err(e) => {
            error!(error = %e, "Failed to parse admission request");
            return Ok(undecodable(WebhookError::decode(e)).into_review());
        }
    };

    Ok(admit(mutator, &request)?.into_review())
}

/// Evaluate a decoded request
pub fn admit(
    mutator: &Mutator,
    request: &AdmissionRequest<DynamicObject>,
) -> Result<AdmissionResponse> {
    let uid = request.uid.as_str();
    info!(
        uid = %uid,
        kind = %request.kind.kind,
        namespace = ?request.namespace,
        name = %request.name,
        operation = ?request.operation,
        "AdmissionReview received"
    );

    let response = AdmissionResponse::from(request);

    let Some(object) = request.object.as_ref() else {
        debug!(uid = %uid, "No object in request, allowing unchanged");
        return Ok(response);
    };

    let pod = match decode_pod(object) {
        Ok(pod) => pod,
        Err(e) => {
            warn!(uid = %uid, error = %e, "Could not decode pod");
            return Ok(fail_open(response, e.to_string()));
        }
    };

    match mutator.evaluate(&pod)? {
        Decision::Skip(reason) => {
            info!(uid = %uid, reason = ?reason, "Skipping mutation");
            Ok(response)
        }
        Decision::Reject(message) => {
            warn!(uid = %uid, error = %message, "Injection rejected, admitting unchanged");
            Ok(fail_open(response, message))
        }
        Decision::Mutate(ops) => {
            info!(uid = %uid, patch_ops = ops.len(), "Applying patch to pod");
            let response = response.with_patch(into_patch(ops)).inspect_err(|e| {
                error!(uid = %uid, error = %e, "Failed to serialize patch");
            })?;
            Ok(response)
        }
    }
}

/// Convert the raw admission object into a Pod
pub fn decode_pod(object: &DynamicObject) -> Result<Pod> {
    let value = serde_json::to_value(object).map_err(WebhookError::decode)?;
    serde_json::from_value(value).map_err(WebhookError::decode)
}

/// Admit unchanged while reporting `message` to the caller
fn fail_open(mut response: AdmissionResponse, message: String) -> AdmissionResponse {
    response.allowed = true;
    response.result = Status::failure(&message, INJECTION_FAILED_REASON);
    response.warnings = Some(vec![message]);
    response
}

/// Response for a body that never became an AdmissionRequest
fn undecodable(err: WebhookError) -> AdmissionResponse {
    let message = err.to_string();
    let mut response = AdmissionResponse::invalid(&message);
    response.allowed = true;
    response.warnings = Some(vec![message]);
    response
}
