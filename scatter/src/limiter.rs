//! Concurrency cap for inbound request handlers.
//!
//! A `concurrency_limit` layer holds the counting semaphore; `load_shed`
//! turns "no permit available" into an immediate error instead of queueing,
//! and the error handler surfaces that as `503 Service Unavailable`. The
//! stack wraps the whole router, outside the dispatcher.

use axum::Router;
use axum::error_handling::HandleErrorLayer;
use http::StatusCode;
use tower::ServiceBuilder;
use tracing::debug;

async fn too_busy(_err: tower::BoxError) -> (StatusCode, &'static str) {
    (StatusCode::SERVICE_UNAVAILABLE, "too busy\n")
}

/// Applies the handler limit to `router`; zero or negative leaves the
/// router unbounded.
pub(crate) fn apply(router: Router, max_handlers: i32) -> Router {
    if max_handlers <= 0 {
        return router;
    }
    debug!(max_handlers, "handler limit enabled");
    router.layer(
        ServiceBuilder::new()
            .layer(HandleErrorLayer::new(too_busy))
            .load_shed()
            .concurrency_limit(max_handlers as usize),
    )
}
