//! Upload, listing, and deletion endpoints

use axum::{
    extract::{Multipart, Path, Query, State},
    Json,
};

use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::types::request::DeleteDocumentParams;
use crate::types::response::{DeleteResponse, DocumentListResponse, DocumentSummary};
use crate::types::UploadResponse;

/// POST /api/upload/document - upload and index one document
pub async fn upload_document(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>> {
    let mut tenant_id: Option<String> = None;
    let mut file: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::InvalidRequest(format!("Failed to read multipart field: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();

        if name == "tenant_id" {
            let value = field
                .text()
                .await
                .map_err(|e| Error::InvalidRequest(format!("Failed to read tenant_id: {}", e)))?;
            tenant_id = Some(value);
            continue;
        }

        if name == "file" || field.file_name().is_some() {
            let filename = field
                .file_name()
                .map(|s| s.to_string())
                .ok_or_else(|| Error::InvalidRequest("File field has no filename".into()))?;
            let data = field
                .bytes()
                .await
                .map_err(|e| Error::InvalidRequest(format!("Failed to read file: {}", e)))?;
            file = Some((filename, data.to_vec()));
        }
    }

    let tenant_id =
        tenant_id.ok_or_else(|| Error::InvalidRequest("Missing tenant_id field".into()))?;
    let (filename, data) =
        file.ok_or_else(|| Error::InvalidRequest("Missing file field".into()))?;

    // Run the pipeline on its own task so it reaches a terminal state (and
    // rolls back partial writes) even if the client disconnects mid-upload
    let pipeline = state.upload_pipeline();
    let receipt = tokio::spawn(async move {
        pipeline.process(&tenant_id, &filename, &data).await
    })
    .await
    .map_err(|e| Error::internal(format!("Upload task failed: {}", e)))??;

    Ok(Json(UploadResponse {
        success: true,
        filename: receipt.document.filename,
        chunks_processed: receipt.chunks_processed,
    }))
}

/// GET /api/upload/list/:tenant_id - list a tenant's documents
pub async fn list_documents(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> Result<Json<DocumentListResponse>> {
    let documents = state.store().list_documents(&tenant_id)?;
    let summaries: Vec<DocumentSummary> = documents.iter().map(DocumentSummary::from).collect();

    Ok(Json(DocumentListResponse {
        success: true,
        count: summaries.len(),
        documents: summaries,
    }))
}

/// DELETE /api/upload/document/:filename - delete a document and its vectors
///
/// Vectors are removed before the metadata record so a failure never leaves
/// orphaned vectors behind a missing record.
pub async fn delete_document(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    Query(params): Query<DeleteDocumentParams>,
) -> Result<Json<DeleteResponse>> {
    let tenant_id = params.tenant_id;
    tracing::info!("Deleting document '{}' for tenant {}", filename, tenant_id);

    let document = state
        .store()
        .get_document(&tenant_id, &filename)?
        .ok_or_else(|| Error::NotFound(format!("Document '{}' not found", filename)))?;

    state.index().delete_document(&tenant_id, &document.id).await?;
    state.store().delete_document(&tenant_id, &filename)?;

    Ok(Json(DeleteResponse {
        success: true,
        message: format!("Document {} deleted", filename),
    }))
}
