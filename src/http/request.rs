//! Request middleware shared by every HTTP listener.
//!
//! # Responsibilities
//! - Generate a UUID v4 `x-request-id` for log correlation
//! - Echo it on the response
//! - Wrap handlers with access logging and a request deadline

use std::time::Duration;

use axum::http::{HeaderName, HeaderValue, Request};
use axum::Router;
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

/// Correlation header added to every request and response.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Mints request ids from random UUIDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Request id of an inbound request, or `"unknown"`.
pub fn request_id<B>(request: &Request<B>) -> String {
    request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

/// Apply the common middleware stack to a finished router.
#[allow(deprecated)]
pub fn with_common_layers(router: Router, request_timeout: Duration) -> Router {
    let header = HeaderName::from_static(X_REQUEST_ID);
    router
        .layer(TimeoutLayer::new(request_timeout))
        .layer(PropagateRequestIdLayer::new(header.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(header, UuidRequestId))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::routing::get;
    use tower::ServiceExt;

    #[tokio::test]
    async fn responses_carry_request_id() {
        let app = with_common_layers(
            Router::new().route("/", get(|| async { "ok" })),
            Duration::from_secs(5),
        );

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let id = response.headers().get(X_REQUEST_ID).unwrap().to_str().unwrap();
        assert!(Uuid::parse_str(id).is_ok());
    }

    #[tokio::test]
    async fn existing_request_id_is_kept() {
        let app = with_common_layers(
            Router::new().route("/", get(|| async { "ok" })),
            Duration::from_secs(5),
        );

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(X_REQUEST_ID, "client-42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.headers().get(X_REQUEST_ID).unwrap(), "client-42");
    }
}
