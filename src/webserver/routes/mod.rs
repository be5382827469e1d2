use crate::webserver::state::AppState;
use axum::Router;
use std::sync::Arc;

pub mod status;
pub mod ws;

/// Upgrade route at the configured path plus the monitoring API under /api
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(ws::routes(&state.config.ws_path))
        .nest("/api", api_routes())
        .with_state(state)
}

fn api_routes() -> Router<Arc<AppState>> {
    Router::new().merge(status::routes())
}
