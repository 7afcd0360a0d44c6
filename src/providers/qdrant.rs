//! Qdrant vector index gateway
//!
//! Tenant isolation is enforced structurally: every tenant owns one
//! collection (`tenant_{id}`), and search never names another tenant's
//! collection. The `source_file` payload filter only narrows results within
//! a collection.

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use uuid::Uuid;

use crate::config::VectorIndexConfig;
use crate::error::{Error, Result};
use crate::types::Chunk;

use super::retry::{with_retries, CallError};
use super::vector_index::{rank_hits, ScoredChunk, VectorIndexProvider};

/// REST gateway to a Qdrant instance with per-tenant collections
pub struct QdrantGateway {
    client: Client,
    config: VectorIndexConfig,
    dimensions: usize,
    /// Collections already verified to exist, so repeat uploads skip the
    /// existence round-trip
    ensured: DashMap<String, ()>,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result: Vec<ScoredPoint>,
}

#[derive(Deserialize)]
struct ScoredPoint {
    score: f32,
    #[serde(default)]
    payload: serde_json::Map<String, Value>,
}

/// Collection name for a tenant
pub fn collection_name(tenant_id: &str) -> String {
    format!("tenant_{}", tenant_id)
}

fn source_file_filter(source_file: &str) -> Value {
    json!({
        "must": [{"key": "source_file", "match": {"value": source_file}}]
    })
}

fn document_filter(document_id: &Uuid) -> Value {
    json!({
        "must": [{"key": "document_id", "match": {"value": document_id.to_string()}}]
    })
}

impl QdrantGateway {
    /// Create a new gateway from config. `dimensions` fixes the vector size
    /// of every collection this gateway creates.
    pub fn new(config: &VectorIndexConfig, dimensions: usize) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(5)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            config: config.clone(),
            dimensions,
            ensured: DashMap::new(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.config.url.trim_end_matches('/'), path);
        let mut request = self.client.request(method, url);
        if !self.config.api_key.is_empty() {
            request = request.header("api-key", &self.config.api_key);
        }
        request
    }

    /// Send one request, classifying transport errors and 5xx as transient
    async fn send(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&Value>,
    ) -> std::result::Result<reqwest::Response, CallError> {
        let mut request = self.request(method, path);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(CallError::transport)?;
        let status = response.status();

        if status.is_server_error() {
            let text = response.text().await.unwrap_or_default();
            return Err(CallError::Transient(format!("HTTP {} - {}", status, text)));
        }

        Ok(response)
    }

    /// Send with retries; any remaining failure becomes `IndexUnavailable`
    async fn send_retrying(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<Value>,
        label: &str,
    ) -> Result<reqwest::Response> {
        let result = with_retries(&self.config.retry, label, || {
            let method = method.clone();
            let body = body.clone();
            async move { self.send(method, path, body.as_ref()).await }
        })
        .await;

        match result {
            Ok(response) => Ok(response),
            Err(CallError::Permanent(e)) => Err(e),
            Err(CallError::Transient(message)) => Err(Error::index(message)),
        }
    }

    fn parse_hit(point: ScoredPoint) -> ScoredChunk {
        let payload = point.payload;
        ScoredChunk {
            text: payload
                .get("text")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
            source_file: payload
                .get("source_file")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_string(),
            page: payload
                .get("page_number")
                .and_then(|v| v.as_u64())
                .map(|p| p as u32),
            ordinal: payload
                .get("ordinal")
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as u32,
            score: point.score,
        }
    }
}

#[async_trait]
impl VectorIndexProvider for QdrantGateway {
    async fn ensure_collection(&self, tenant_id: &str) -> Result<()> {
        let collection = collection_name(tenant_id);
        if self.ensured.contains_key(&collection) {
            return Ok(());
        }

        let path = format!("/collections/{}", collection);
        let response = self
            .send_retrying(reqwest::Method::GET, &path, None, "collection lookup")
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            tracing::info!("Creating collection {}", collection);
            let body = json!({
                "vectors": {"size": self.dimensions, "distance": "Cosine"}
            });
            let response = self
                .send_retrying(reqwest::Method::PUT, &path, Some(body), "collection create")
                .await?;
            // A concurrent upload may have created it first
            if !response.status().is_success() && response.status() != StatusCode::CONFLICT {
                let text = response.text().await.unwrap_or_default();
                return Err(Error::index(format!("Collection create failed: {}", text)));
            }
        }

        // Keyword index on source_file, required for filtered search and
        // delete. Safe to call when it already exists.
        let index_path = format!("/collections/{}/index", collection);
        let index_body = json!({"field_name": "source_file", "field_schema": "keyword"});
        let response = self
            .send_retrying(reqwest::Method::PUT, &index_path, Some(index_body), "payload index")
            .await?;
        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            if !text.to_lowercase().contains("already exists") {
                tracing::warn!("Payload index setup for {} returned: {}", collection, text);
            }
        }

        let doc_index_body = json!({"field_name": "document_id", "field_schema": "keyword"});
        let _ = self
            .send_retrying(reqwest::Method::PUT, &index_path, Some(doc_index_body), "payload index")
            .await?;

        self.ensured.insert(collection, ());
        Ok(())
    }

    async fn upsert_chunks(&self, tenant_id: &str, chunks: &[Chunk]) -> Result<()> {
        let collection = collection_name(tenant_id);
        let path = format!("/collections/{}/points?wait=true", collection);
        let batch_size = self.config.upsert_batch_size.max(1);
        let total_batches = chunks.len().div_ceil(batch_size);

        for (batch_num, batch) in chunks.chunks(batch_size).enumerate() {
            let points: Vec<Value> = batch
                .iter()
                .map(|chunk| {
                    json!({
                        "id": chunk.point_id().to_string(),
                        "vector": chunk.embedding,
                        "payload": {
                            "text": chunk.text,
                            "source_file": chunk.source_file,
                            "document_id": chunk.document_id.to_string(),
                            "tenant_id": chunk.tenant_id,
                            "ordinal": chunk.ordinal,
                            "page_number": chunk.page,
                            "section": chunk.section,
                        },
                    })
                })
                .collect();

            let body = json!({"points": points});
            let response = self
                .send_retrying(reqwest::Method::PUT, &path, Some(body), "point upsert")
                .await?;

            if !response.status().is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(Error::index(format!("Upsert rejected: {}", text)));
            }

            tracing::debug!(
                "Upserted batch {}/{} ({} points) to {}",
                batch_num + 1,
                total_batches,
                batch.len(),
                collection
            );
        }

        tracing::info!("Upserted {} chunks to {}", chunks.len(), collection);
        Ok(())
    }

    async fn search(
        &self,
        tenant_id: &str,
        query: &[f32],
        top_k: usize,
        source_file: Option<&str>,
    ) -> Result<Vec<ScoredChunk>> {
        let collection = collection_name(tenant_id);
        let path = format!("/collections/{}/points/search", collection);

        let mut body = json!({
            "vector": query,
            "limit": top_k,
            "with_payload": true,
        });
        if let Some(source) = source_file {
            body["filter"] = source_file_filter(source);
        }

        let response = self
            .send_retrying(reqwest::Method::POST, &path, Some(body), "vector search")
            .await?;

        // A tenant that never uploaded has no collection yet
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::index(format!("Search rejected: {}", text)));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| Error::index(format!("Failed to parse search response: {}", e)))?;

        let mut hits: Vec<ScoredChunk> = parsed.result.into_iter().map(Self::parse_hit).collect();
        rank_hits(&mut hits);

        Ok(hits)
    }

    async fn delete_document(&self, tenant_id: &str, document_id: &Uuid) -> Result<()> {
        let collection = collection_name(tenant_id);
        let path = format!("/collections/{}/points/delete?wait=true", collection);
        let body = json!({"filter": document_filter(document_id)});

        let response = self
            .send_retrying(reqwest::Method::POST, &path, Some(body), "point delete")
            .await?;

        // Nothing to delete if the collection was never created
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::index(format!("Delete rejected: {}", text)));
        }

        tracing::info!("Deleted vectors for document {} from {}", document_id, collection);
        Ok(())
    }

    fn name(&self) -> &str {
        "qdrant"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_name_is_tenant_scoped() {
        assert_eq!(collection_name("acme"), "tenant_acme");
        assert_ne!(collection_name("acme"), collection_name("globex"));
    }

    #[test]
    fn test_source_file_filter_shape() {
        let filter = source_file_filter("report.pdf");
        assert_eq!(filter["must"][0]["key"], "source_file");
        assert_eq!(filter["must"][0]["match"]["value"], "report.pdf");
    }

    #[test]
    fn test_parse_hit_reads_payload() {
        let point: ScoredPoint = serde_json::from_value(json!({
            "score": 0.87,
            "payload": {
                "text": "hello",
                "source_file": "a.pdf",
                "ordinal": 3,
                "page_number": 2,
            }
        }))
        .unwrap();

        let hit = QdrantGateway::parse_hit(point);
        assert_eq!(hit.text, "hello");
        assert_eq!(hit.source_file, "a.pdf");
        assert_eq!(hit.ordinal, 3);
        assert_eq!(hit.page, Some(2));
        assert!((hit.score - 0.87).abs() < 1e-6);
    }
}
