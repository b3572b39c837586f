use crate::registry::{RegistryError, RunId, Suggestion, TextChange, TextEdit};
use crate::repair::SessionStatus;
use crate::runner::TestRunner;
use crate::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

fn error_response(status: StatusCode, message: impl std::fmt::Display) -> Response {
    (
        status,
        Json(serde_json::json!({ "error": message.to_string() })),
    )
        .into_response()
}

fn registry_error(e: RegistryError) -> Response {
    let status = match e {
        RegistryError::NotOpen(_) | RegistryError::NotFound(_) => StatusCode::NOT_FOUND,
        RegistryError::Stale { .. } => StatusCode::CONFLICT,
        RegistryError::InvalidRange { .. } => StatusCode::BAD_REQUEST,
    };
    error_response(status, e)
}

/// Local path of a `file://` URI.
fn path_from_uri(uri: &str) -> Option<PathBuf> {
    uri.strip_prefix("file://").map(PathBuf::from)
}

// ============================================================================
// Status & config
// ============================================================================

#[derive(Serialize)]
pub struct StatusResponse {
    pub status: SessionStatus,
    pub version: &'static str,
}

/// API: Get session status
pub async fn api_status<R: TestRunner>(State(state): State<Arc<AppState<R>>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: state.session.status(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// API: Get current config
pub async fn api_get_config<R: TestRunner>(State(state): State<Arc<AppState<R>>>) -> impl IntoResponse {
    let config = state.config.read().await;
    Json(config.clone())
}

/// API: Save current config to file
pub async fn api_save_config<R: TestRunner>(State(state): State<Arc<AppState<R>>>) -> impl IntoResponse {
    let config = state.config.read().await;
    match config.save(state.config_path.as_deref()) {
        Ok(path) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": true,
                "path": path.display().to_string()
            })),
        )
            .into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e)),
    }
}

// ============================================================================
// Documents
// ============================================================================

#[derive(Deserialize)]
pub struct DocumentRequest {
    pub uri: String,
    /// Current editor text; read from disk when absent.
    #[serde(default)]
    pub text: Option<String>,
    /// File to run; derived from a `file://` URI when absent.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Serialize)]
pub struct DocumentResponse {
    pub uri: String,
    /// Whether a repair run was started in the background.
    pub run_started: bool,
    pub run_id: Option<RunId>,
}

#[derive(Clone, Copy)]
enum Trigger {
    Open,
    Save,
}

async fn track_document<R: TestRunner>(
    state: Arc<AppState<R>>,
    req: DocumentRequest,
    trigger: Trigger,
) -> Response {
    let Some(path) = req.path.clone().or_else(|| path_from_uri(&req.uri)) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("no file path for {}", req.uri),
        );
    };

    let text = match req.text {
        Some(text) => text,
        None => match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    format!("failed to read {}: {}", path.display(), e),
                )
            }
        },
    };

    let enabled = {
        let config = state.config.read().await;
        match trigger {
            Trigger::Open => config.triggers.run_on_open,
            Trigger::Save => config.triggers.run_on_save,
        }
    };

    // Begin under the same lock as the open so later edits are journaled
    let pending = {
        let mut registry = state.session.registry().write().await;
        registry.open(&req.uri, text);
        if enabled {
            match state.session.begin_run(&mut registry, &req.uri) {
                Ok(pending) => Some(pending),
                Err(e) => return registry_error(e),
            }
        } else {
            None
        }
    };

    let run_id = pending.as_ref().map(|pending| pending.id());
    if let Some(pending) = pending {
        let session = Arc::clone(&state.session);
        let uri = req.uri.clone();
        tokio::spawn(async move {
            if let Err(e) = session.execute(&uri, &path, pending).await {
                tracing::warn!("Repair run for {} failed: {:#}", uri, e);
            }
        });
    }

    (
        StatusCode::ACCEPTED,
        Json(DocumentResponse {
            uri: req.uri,
            run_started: run_id.is_some(),
            run_id,
        }),
    )
        .into_response()
}

/// API: A document was opened in the editor
pub async fn open_document<R: TestRunner>(
    State(state): State<Arc<AppState<R>>>,
    Json(req): Json<DocumentRequest>,
) -> Response {
    track_document(state, req, Trigger::Open).await
}

/// API: A document was saved
pub async fn save_document<R: TestRunner>(
    State(state): State<Arc<AppState<R>>>,
    Json(req): Json<DocumentRequest>,
) -> Response {
    track_document(state, req, Trigger::Save).await
}

#[derive(Deserialize)]
pub struct UriRequest {
    pub uri: String,
}

/// API: A document was closed
pub async fn close_document<R: TestRunner>(
    State(state): State<Arc<AppState<R>>>,
    Json(req): Json<UriRequest>,
) -> impl IntoResponse {
    let closed = state.session.registry().write().await.close(&req.uri);
    Json(serde_json::json!({ "closed": closed }))
}

#[derive(Deserialize)]
pub struct ChangeRequest {
    pub uri: String,
    pub changes: Vec<TextChange>,
}

/// API: The editor changed a document's text
pub async fn change_document<R: TestRunner>(
    State(state): State<Arc<AppState<R>>>,
    Json(req): Json<ChangeRequest>,
) -> Response {
    let mut registry = state.session.registry().write().await;
    for change in req.changes {
        if let Err(e) = registry.apply_text_change(&req.uri, change) {
            return registry_error(e);
        }
    }
    StatusCode::NO_CONTENT.into_response()
}

// ============================================================================
// Suggestions & fixes
// ============================================================================

/// API: Suggestions for a document
pub async fn list_suggestions<R: TestRunner>(
    State(state): State<Arc<AppState<R>>>,
    Query(query): Query<UriRequest>,
) -> Json<Vec<Suggestion>> {
    Json(state.session.registry().read().await.list_suggestions(&query.uri))
}

#[derive(Deserialize)]
pub struct FixRequest {
    pub uri: String,
    pub code: String,
}

/// API: The edit behind a suggestion
pub async fn resolve_fix<R: TestRunner>(
    State(state): State<Arc<AppState<R>>>,
    Json(req): Json<FixRequest>,
) -> Result<Json<TextEdit>, Response> {
    state
        .session
        .registry()
        .read()
        .await
        .fix_edit(&req.uri, &req.code)
        .map(Json)
        .map_err(registry_error)
}

/// API: Apply a suggestion to the tracked document
pub async fn apply_fix<R: TestRunner>(
    State(state): State<Arc<AppState<R>>>,
    Json(req): Json<FixRequest>,
) -> Result<Json<TextEdit>, Response> {
    let edit = state
        .session
        .registry()
        .write()
        .await
        .apply_fix(&req.uri, &req.code)
        .map_err(registry_error)?;

    tracing::info!("Applied fix {} to {}", req.code, req.uri);
    Ok(Json(edit))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_from_uri() {
        assert_eq!(
            path_from_uri("file:///work/a.test.js"),
            Some(PathBuf::from("/work/a.test.js"))
        );
        assert_eq!(path_from_uri("untitled:1"), None);
    }

    #[test]
    fn test_registry_error_status() {
        let not_found = registry_error(RegistryError::NotFound("1".to_string()));
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let stale = registry_error(RegistryError::Stale {
            code: "1".to_string(),
            expected: "+".to_string(),
            found: "-".to_string(),
        });
        assert_eq!(stale.status(), StatusCode::CONFLICT);

        let reversed = registry_error(RegistryError::InvalidRange {
            start: crate::registry::Position::new(1, 0),
            end: crate::registry::Position::new(0, 0),
        });
        assert_eq!(reversed.status(), StatusCode::BAD_REQUEST);
    }
}
