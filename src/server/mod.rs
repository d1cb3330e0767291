//! HTTP server for the merge guard bot.
//!
//! # Endpoints
//!
//! - `POST /webhook` - accepts GitHub webhook deliveries (202 on accepted or
//!   ignored events, 400 on malformed payloads, 401 on signature failures)
//! - `GET /healthz` - liveness probe, returns `{"status":"ok"}`

use std::sync::Arc;

use tower_http::trace::TraceLayer;

use crate::aggregator::{CheckRunApi, Dispatcher};

pub mod health;
pub mod webhook;

pub use health::health_handler;
pub use webhook::webhook_handler;

/// Shared application state, passed to handlers via Axum's `State` extractor.
pub struct AppState<A> {
    inner: Arc<AppStateInner<A>>,
}

struct AppStateInner<A> {
    dispatcher: Dispatcher<A>,
    /// Shared webhook secret. `None` skips signature verification - an
    /// explicitly insecure mode for local testing, warned about at startup.
    webhook_secret: Option<Vec<u8>>,
}

// Manual impl: `A` itself need not be Clone behind the Arc.
impl<A> Clone for AppState<A> {
    fn clone(&self) -> Self {
        AppState {
            inner: self.inner.clone(),
        }
    }
}

impl<A: CheckRunApi> AppState<A> {
    pub fn new(dispatcher: Dispatcher<A>, webhook_secret: Option<Vec<u8>>) -> Self {
        AppState {
            inner: Arc::new(AppStateInner {
                dispatcher,
                webhook_secret,
            }),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher<A> {
        &self.inner.dispatcher
    }

    pub fn webhook_secret(&self) -> Option<&[u8]> {
        self.inner.webhook_secret.as_deref()
    }
}

/// Builds the axum router over the given state.
pub fn build_router<A: CheckRunApi>(state: AppState<A>) -> axum::Router {
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/webhook", post(webhook_handler::<A>))
        .route("/healthz", get(health_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
