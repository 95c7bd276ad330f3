//! Request instrumentation for the server's own routes.

use std::convert::Infallible;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use scrapeline_core::LabelSet;

use super::{HEALTHZ_PATH, METRICS_PATH};
use crate::app_state::AppState;

/// Unknown paths share one label value so clients cannot grow the series set.
fn path_label(path: &str) -> &'static str {
    match path {
        METRICS_PATH => METRICS_PATH,
        HEALTHZ_PATH => HEALTHZ_PATH,
        _ => "other",
    }
}

pub async fn instrument(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let labels = LabelSet::new()
        .with("method", req.method().as_str())
        .with("path", path_label(req.uri().path()));

    let measured = state
        .http()
        .measure_async(&labels, move |mut duration_labels| async move {
            let res = next.run(req).await;
            duration_labels.set("code", res.status().as_str());
            (duration_labels, Ok::<_, Infallible>(res))
        })
        .await;

    match measured {
        Ok(res) => {
            tracing::debug!(%labels, status = %res.status(), "served");
            res
        }
        Err(e) => {
            tracing::error!(%labels, error = %e, "request instrumentation failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
