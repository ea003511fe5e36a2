//! HTTP routes.

pub mod events;
pub mod health;
pub mod relay;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Builds the full application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .nest(
            "/api/v1/relay",
            relay::router().merge(events::router()),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
