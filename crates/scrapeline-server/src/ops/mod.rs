//! Operational HTTP endpoints.
//!
//! - `/metrics` : Prometheus text format, gzip-compressed when large and accepted
//! - `/healthz` : liveness
//! - anything else : permanent redirect to `/metrics`

pub mod access;

use std::io::Write;

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use flate2::{write::GzEncoder, Compression};

use crate::app_state::AppState;

pub const METRICS_PATH: &str = "/metrics";
pub const HEALTHZ_PATH: &str = "/healthz";

/// Scrape bodies up to this size are sent uncompressed.
pub const COMPRESS_MIN_BYTES: usize = 512;

const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

pub async fn metrics(State(state): State<AppState>, headers: HeaderMap) -> Response {
    exposition(state.registry().render(), &headers)
}

fn exposition(body: String, headers: &HeaderMap) -> Response {
    if body.len() > COMPRESS_MIN_BYTES && accepts_gzip(headers) {
        match gzip(body.as_bytes()) {
            Ok(compressed) => {
                return (
                    StatusCode::OK,
                    [
                        (header::CONTENT_TYPE, EXPOSITION_CONTENT_TYPE),
                        (header::CONTENT_ENCODING, "gzip"),
                        (header::VARY, "accept-encoding"),
                    ],
                    compressed,
                )
                    .into_response();
            }
            Err(e) => tracing::warn!(error = %e, "gzip failed, sending uncompressed"),
        }
    }

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, EXPOSITION_CONTENT_TYPE),
            (header::VARY, "accept-encoding"),
        ],
        body,
    )
        .into_response()
}

/// Whether `Accept-Encoding` allows gzip (`gzip` or `*`, not refused with `q=0`).
fn accepts_gzip(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::ACCEPT_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|coding| {
            let mut parts = coding.split(';');
            let name = parts.next().unwrap_or_default().trim();
            let refused = parts.any(|p| {
                p.trim()
                    .strip_prefix("q=")
                    .and_then(|q| q.parse::<f32>().ok())
                    .is_some_and(|q| q == 0.0)
            });
            (name.eq_ignore_ascii_case("gzip") || name == "*") && !refused
        })
}

fn gzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

pub async fn redirect() -> impl IntoResponse {
    (
        StatusCode::MOVED_PERMANENTLY,
        [
            (header::LOCATION, METRICS_PATH),
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
        ],
        "Try /metrics",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn accept(v: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT_ENCODING, HeaderValue::from_static(v));
        headers
    }

    #[test]
    fn gzip_negotiation() {
        assert!(accepts_gzip(&accept("gzip")));
        assert!(accepts_gzip(&accept("deflate, GZIP;q=0.5")));
        assert!(accepts_gzip(&accept("*")));
        assert!(!accepts_gzip(&accept("gzip;q=0")));
        assert!(!accepts_gzip(&accept("br, deflate")));
        assert!(!accepts_gzip(&HeaderMap::new()));
    }

    #[test]
    fn small_bodies_stay_uncompressed() {
        let res = exposition("up 1\n".to_string(), &accept("gzip"));
        assert!(res.headers().get(header::CONTENT_ENCODING).is_none());

        let res = exposition("x".repeat(COMPRESS_MIN_BYTES + 1), &accept("gzip"));
        assert_eq!(res.headers().get(header::CONTENT_ENCODING).unwrap(), "gzip");

        let res = exposition("x".repeat(COMPRESS_MIN_BYTES + 1), &HeaderMap::new());
        assert!(res.headers().get(header::CONTENT_ENCODING).is_none());
    }
}
