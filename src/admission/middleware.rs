//! axum integration for the admission gate.
//!
//! Install with `route_layer` so the matched route template is known:
//!
//! ```ignore
//! let app = Router::new()
//!     .route("/feed", get(feed))
//!     .route_layer(middleware::from_fn_with_state(controller, admission_middleware));
//! ```

use crate::admission::controller::{AdmissionController, Rejection};
use axum::{
    extract::{ConnectInfo, MatchedPath, Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::time::Instant;

/// Caller identity established upstream (e.g. by authentication).
///
/// Takes precedence over addresses when present in request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity(pub String);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RejectionBody {
    error: &'static str,
    retry_after_seconds: u64,
}

impl Rejection {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Rejection::Overloaded | Rejection::QueueFull => StatusCode::SERVICE_UNAVAILABLE,
            Rejection::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let retry_after = self.retry_after().as_secs();
        let body = RejectionBody {
            error: self.message(),
            retry_after_seconds: retry_after,
        };

        let mut response = (self.status_code(), Json(body)).into_response();
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
        response
    }
}

/// Gate every request through [`AdmissionController::admit`] and record its
/// latency and outcome once the handler finishes.
pub async fn admission_middleware(
    State(controller): State<Arc<AdmissionController>>,
    request: Request,
    next: Next,
) -> Response {
    let identity = caller_identity(&request);
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let _permit = match controller.admit(&identity, &endpoint) {
        Ok(permit) => permit,
        Err(rejection) => {
            tracing::info!(identity = %identity, endpoint = %endpoint, reason = %rejection, "Request rejected");
            return rejection.into_response();
        },
    };

    let started = Instant::now();
    let response = next.run(request).await;
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

    let monitor = controller.monitor();
    monitor.track_request(&endpoint, elapsed_ms);
    if response.status().is_server_error() {
        monitor.track_error(&endpoint);
    }

    response
}

fn caller_identity(request: &Request) -> String {
    if let Some(CallerIdentity(id)) = request.extensions().get::<CallerIdentity>() {
        return id.clone();
    }

    let forwarded = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn test_rejection_response() {
        let response = Rejection::RateLimited.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "60");

        assert_eq!(Rejection::Overloaded.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(Rejection::QueueFull.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_identity_precedence() {
        let mut request = axum::http::Request::builder()
            .uri("/feed")
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(caller_identity(&request), "203.0.113.7");

        request
            .extensions_mut()
            .insert(CallerIdentity("user:42".to_string()));
        assert_eq!(caller_identity(&request), "user:42");

        let bare = axum::http::Request::builder().uri("/feed").body(Body::empty()).unwrap();
        assert_eq!(caller_identity(&bare), "unknown");
    }
}
