//! Vector index provider trait

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::types::Chunk;

/// One similarity search hit
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    /// Chunk text
    pub text: String,
    /// Source filename
    pub source_file: String,
    /// Page number, if recorded
    pub page: Option<u32>,
    /// Chunk ordinal within its document
    pub ordinal: u32,
    /// Cosine similarity, higher is better
    pub score: f32,
}

/// Trait for tenant-scoped vector storage and similarity search
///
/// Each tenant owns one collection; chunks from different tenants are never
/// searched together.
#[async_trait]
pub trait VectorIndexProvider: Send + Sync {
    /// Create the tenant's collection if it does not exist yet
    async fn ensure_collection(&self, tenant_id: &str) -> Result<()>;

    /// Upsert chunk vectors. Idempotent: deterministic point IDs make
    /// re-runs overwrite rather than duplicate.
    async fn upsert_chunks(&self, tenant_id: &str, chunks: &[Chunk]) -> Result<()>;

    /// Top-k similarity search, optionally narrowed to one source file.
    /// Results are ordered by descending score; ties break by ascending
    /// chunk ordinal.
    async fn search(
        &self,
        tenant_id: &str,
        query: &[f32],
        top_k: usize,
        source_file: Option<&str>,
    ) -> Result<Vec<ScoredChunk>>;

    /// Remove all vectors owned by a document
    async fn delete_document(&self, tenant_id: &str, document_id: &Uuid) -> Result<()>;

    /// Provider name for logging
    fn name(&self) -> &str;
}

/// Order search hits by descending score, breaking ties by ascending ordinal
/// so earlier chunks win.
pub fn rank_hits(hits: &mut [ScoredChunk]) {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.ordinal.cmp(&b.ordinal))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(ordinal: u32, score: f32) -> ScoredChunk {
        ScoredChunk {
            text: String::new(),
            source_file: "a.pdf".into(),
            page: None,
            ordinal,
            score,
        }
    }

    #[test]
    fn test_rank_hits_breaks_ties_by_ordinal() {
        let mut hits = vec![hit(5, 0.8), hit(2, 0.9), hit(1, 0.8)];
        rank_hits(&mut hits);

        let order: Vec<u32> = hits.iter().map(|h| h.ordinal).collect();
        assert_eq!(order, vec![2, 1, 5]);
    }
}
