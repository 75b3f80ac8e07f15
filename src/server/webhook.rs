//! Webhook endpoint handler.
//!
//! Verifies the signature when a secret is configured, hands the payload to
//! the classifier, and wakes the coordinator when work was enqueued. The
//! response is 200 for accepted and ignored events alike; the tracker only
//! needs to know the delivery landed.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{debug, warn};

use super::AppState;
use super::signature::verify_signature;
use crate::classifier::tracker::TrackerParser;
use crate::store::Store;

/// Header carrying the HMAC-SHA256 payload signature.
const HEADER_SIGNATURE: &str = "x-hub-signature-256";

/// Errors that reject a webhook delivery.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// A secret is configured but the request carries no signature.
    #[error("missing signature header")]
    MissingSignature,

    /// The signature does not match the payload.
    #[error("invalid signature")]
    InvalidSignature,

    /// The body is not valid JSON.
    #[error("invalid JSON body: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebhookError::MissingSignature | WebhookError::InvalidSignature => {
                StatusCode::UNAUTHORIZED
            }
            WebhookError::InvalidJson(_) => StatusCode::BAD_REQUEST,
        };
        (status, self.to_string()).into_response()
    }
}

/// Webhook handler.
///
/// # Response
///
/// - 200 OK: delivery processed (enqueued or ignored)
/// - 400 Bad Request: body is not JSON
/// - 401 Unauthorized: missing or invalid signature
pub async fn webhook_handler<S, P>(
    State(state): State<AppState<S, P>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, &'static str), WebhookError>
where
    S: Store + Clone + 'static,
    P: TrackerParser + 'static,
{
    // Verify before parsing; unauthenticated requests get no further work
    if let Some(secret) = state.webhook_secret() {
        let header = headers
            .get(HEADER_SIGNATURE)
            .and_then(|v| v.to_str().ok())
            .ok_or(WebhookError::MissingSignature)?;
        if !verify_signature(&body, header, secret) {
            warn!("webhook rejected: invalid signature");
            return Err(WebhookError::InvalidSignature);
        }
    }

    let event: serde_json::Value = serde_json::from_slice(&body)?;

    if state.parser().classify_and_enqueue(&event).await {
        state.wake().hook_accepted().await;
        Ok((StatusCode::OK, "accepted"))
    } else {
        debug!("webhook ignored");
        Ok((StatusCode::OK, "ignored"))
    }
}
