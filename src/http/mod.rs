//! HTTP surface: session endpoints, catalog, snapshots, the evaluator
//! pre-check, lifecycle transitions and per-floor live snapshots.

mod error;
mod handlers;
mod live;
mod session;

pub use error::ApiError;
pub use session::Caller;

use std::sync::Arc;

use axum::extract::{MatchedPath, Request};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post, put};
use axum::Router;

use crate::identity::{IdentityProvider, Sessions};
use crate::lifecycle::Lifecycle;
use crate::observability;

#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<Lifecycle>,
    pub sessions: Arc<Sessions>,
    pub identity: Arc<dyn IdentityProvider>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/session", get(session::get_session))
        .route("/session/login", post(session::login))
        .route("/session/logout", post(session::logout))
        .route("/session/token", put(session::put_token))
        .route("/floors", get(handlers::floors))
        .route(
            "/floors/{floor}/bookings",
            get(handlers::snapshot).post(handlers::submit),
        )
        .route("/floors/{floor}/evaluate", post(handlers::evaluate))
        .route("/floors/{floor}/live", get(live::live))
        .route("/bookings/{id}/approve", post(handlers::approve))
        .route("/bookings/{id}/decline", post(handlers::decline))
        .route("/bookings/{id}/cancel", post(handlers::cancel))
        .layer(middleware::from_fn(track_requests))
        .with_state(state)
}

async fn track_requests(req: Request, next: Next) -> Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".into());
    let response = next.run(req).await;
    metrics::counter!(
        observability::HTTP_REQUESTS_TOTAL,
        "route" => route,
        "status" => response.status().as_u16().to_string()
    )
    .increment(1);
    response
}
