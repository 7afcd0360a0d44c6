//! Question answering and chat history endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::error::{Error, Result};
use crate::pipeline::QuestionPipeline;
use crate::server::state::AppState;
use crate::types::request::{ClearHistoryParams, HistoryParams};
use crate::types::response::{DeleteResponse, HistoryResponse};
use crate::types::{AskRequest, AskResponse};

/// POST /api/chat/ask - answer a question in RAG or general mode
///
/// Pipeline failures come back as a conversational apology with the
/// structured error code attached, so the caller never sees raw internals.
/// Malformed requests still fail with a proper 400.
pub async fn ask(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AskResponse>> {
    let mode = QuestionPipeline::mode_for(&request);

    match state.question_pipeline().answer(&request).await {
        Ok(response) => Ok(Json(response)),
        Err(e @ Error::InvalidRequest(_)) => Err(e),
        Err(e) => {
            tracing::error!("Question failed for tenant {}: {}", request.tenant_id, e);
            Ok(Json(AskResponse::apology(mode, e.code())))
        }
    }
}

/// GET /api/chat/history/:tenant_id - list chat turns, newest first
pub async fn get_history(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<HistoryResponse>> {
    let history =
        state
            .store()
            .list_chat_turns(&tenant_id, params.source_file.as_deref(), params.limit)?;

    Ok(Json(HistoryResponse {
        success: true,
        count: history.len(),
        history,
    }))
}

/// DELETE /api/chat/history/:tenant_id - clear chat turns, optionally for
/// one source document. Irreversible.
pub async fn clear_history(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Query(params): Query<ClearHistoryParams>,
) -> Result<Json<DeleteResponse>> {
    let deleted = state
        .store()
        .clear_chat_turns(&tenant_id, params.source_file.as_deref())?;

    let label = params
        .source_file
        .as_deref()
        .map(|s| format!("for {}", s))
        .unwrap_or_else(|| "for all documents".to_string());
    tracing::info!("Cleared {} chat turns ({}) for {}", deleted, label, tenant_id);

    Ok(Json(DeleteResponse {
        success: true,
        message: format!("Chat history cleared ({})", label),
    }))
}
