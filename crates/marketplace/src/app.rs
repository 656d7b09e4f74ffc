//! Router assembly.

use axum::{Router, body::Body, http::Request, middleware};
use tower_http::trace::TraceLayer;

use crate::middleware::{
    api_rate_limiter, order_rate_limiter, request_id_middleware, security_headers_middleware,
    session_gate,
};
use crate::routes;
use crate::state::AppState;

/// Build the full application router.
///
/// Rate limiting keys on proxy headers or the peer address, so serve with
/// `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(routes::routes())
        .merge(routes::order_routes().layer(order_rate_limiter()))
        .merge(routes::api_routes().layer(api_rate_limiter()))
        .layer(middleware::from_fn_with_state(state.clone(), session_gate))
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                path = %request.uri().path(),
                request_id = tracing::field::Empty,
                user_id = tracing::field::Empty,
            )
        }))
        .with_state(state)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}
