mod adaptive;
mod health;

use axum::Router;

use crate::response::AppError;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/health", health::router())
        .nest("/api/adaptive", adaptive::router())
        .fallback(fallback_handler)
        .with_state(state)
}

async fn fallback_handler() -> AppError {
    AppError::not_found("route not found")
}
