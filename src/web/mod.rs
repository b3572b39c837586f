mod handlers;

use crate::runner::TestRunner;
use crate::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Build the API router
pub fn router<R: TestRunner>(state: Arc<AppState<R>>) -> Router {
    Router::new()
        // Status & config
        .route("/api/status", get(handlers::api_status::<R>))
        .route("/api/config", get(handlers::api_get_config::<R>))
        .route("/api/config/save", post(handlers::api_save_config::<R>))
        // Documents
        .route("/api/documents/open", post(handlers::open_document::<R>))
        .route("/api/documents/save", post(handlers::save_document::<R>))
        .route("/api/documents/close", post(handlers::close_document::<R>))
        .route("/api/documents/change", post(handlers::change_document::<R>))
        // Suggestions & fixes
        .route("/api/suggestions", get(handlers::list_suggestions::<R>))
        .route("/api/fixes/resolve", post(handlers::resolve_fix::<R>))
        .route("/api/fixes/apply", post(handlers::apply_fix::<R>))
        .with_state(state)
}

/// Start the API server
pub async fn start_server<R: TestRunner>(
    state: Arc<AppState<R>>,
    host: &str,
    port: u16,
) -> anyhow::Result<()> {
    let app = router(state);

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("API server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
