//! Axum router wiring.
//!
//! Every route, the redirect fallback included, passes through the request
//! instrumentation layer.

use axum::{middleware, routing::get, Router};

use crate::app_state::AppState;
use crate::ops;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(ops::METRICS_PATH, get(ops::metrics))
        .route(ops::HEALTHZ_PATH, get(ops::healthz))
        .fallback(ops::redirect)
        .layer(middleware::from_fn_with_state(state.clone(), ops::access::instrument))
        .with_state(state)
}
