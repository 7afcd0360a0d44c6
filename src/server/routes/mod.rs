//! API routes for the RAG server

pub mod chat;
pub mod upload;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};

use crate::server::state::AppState;

/// Build all API routes
pub fn api_routes(max_upload_size: usize) -> Router<AppState> {
    Router::new()
        // Document management
        .route(
            "/upload/document",
            post(upload::upload_document).layer(DefaultBodyLimit::max(max_upload_size)),
        )
        .route("/upload/list/:tenant_id", get(upload::list_documents))
        .route("/upload/document/:filename", delete(upload::delete_document))
        // Questions and history
        .route("/chat/ask", post(chat::ask))
        .route("/chat/history/:tenant_id", get(chat::get_history))
        .route("/chat/history/:tenant_id", delete(chat::clear_history))
        // Info
        .route("/info", get(info))
}

/// API info endpoint
async fn info() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "name": "tenant-rag",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Multi-tenant document Q&A with vector retrieval and dual-model answers",
        "endpoints": {
            "POST /api/upload/document": "Upload and index a document",
            "GET /api/upload/list/:tenant_id": "List a tenant's documents",
            "DELETE /api/upload/document/:filename": "Delete a document and its vectors",
            "POST /api/chat/ask": "Ask a question (RAG or general mode)",
            "GET /api/chat/history/:tenant_id": "Get chat history",
            "DELETE /api/chat/history/:tenant_id": "Clear chat history"
        }
    }))
}
