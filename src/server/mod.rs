//! HTTP server for the relay.
//!
//! # Endpoints
//!
//! - `POST /webhook` - Accepts tracker webhook deliveries (returns 200)
//! - `GET /health` - Returns 200 if the server is running

use std::sync::Arc;

pub mod health;
pub mod signature;
pub mod webhook;

pub use health::health_handler;
pub use webhook::webhook_handler;

use crate::classifier::HookParser;
use crate::classifier::tracker::TrackerParser;
use crate::fsm::WakeHandle;
use crate::store::Store;

/// Shared application state, passed to handlers via axum's `State`
/// extractor.
pub struct AppState<S, P> {
    inner: Arc<AppStateInner<S, P>>,
}

// Derived Clone would demand S: Clone and P: Clone; the Arc makes both
// unnecessary.
impl<S, P> Clone for AppState<S, P> {
    fn clone(&self) -> Self {
        AppState {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct AppStateInner<S, P> {
    /// Classifier the webhook handler feeds accepted payloads to.
    parser: HookParser<S, P>,

    /// Signals the coordinator after an accepted delivery.
    wake: WakeHandle,

    /// Shared secret for signature verification. `None` disables it.
    webhook_secret: Option<Vec<u8>>,
}

impl<S, P> AppState<S, P> {
    pub fn new(parser: HookParser<S, P>, wake: WakeHandle, webhook_secret: Option<Vec<u8>>) -> Self {
        AppState {
            inner: Arc::new(AppStateInner {
                parser,
                wake,
                webhook_secret,
            }),
        }
    }

    pub fn parser(&self) -> &HookParser<S, P> {
        &self.inner.parser
    }

    pub fn wake(&self) -> &WakeHandle {
        &self.inner.wake
    }

    pub fn webhook_secret(&self) -> Option<&[u8]> {
        self.inner.webhook_secret.as_deref()
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router<S, P>(app_state: AppState<S, P>) -> axum::Router
where
    S: Store + Clone + 'static,
    P: TrackerParser + 'static,
{
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/webhook", post(webhook_handler::<S, P>))
        .route("/health", get(health_handler))
        .with_state(app_state)
}
