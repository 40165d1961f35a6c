//! In-process vector index with cosine similarity.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use tracing::debug;

use studio_core::{
    IndexStats, Result, StudioError, VectorFilter, VectorMatch, VectorRecord, VectorStore,
};

/// Vector index held in memory, keyed by record id.
///
/// Upserting an existing id replaces it. Query results are ordered by
/// descending cosine similarity, ties broken by id.
#[derive(Default)]
pub struct InMemoryVectorStore {
    records: RwLock<BTreeMap<String, VectorRecord>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored vectors.
    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Cosine similarity between two vectors; 0 for mismatched or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, records: &[VectorRecord]) -> Result<usize> {
        let mut map = self
            .records
            .write()
            .map_err(|e| StudioError::vector_store(e.to_string()))?;

        for record in records {
            map.insert(record.id.clone(), record.clone());
        }

        debug!("Upserted {} vectors in memory", records.len());
        Ok(records.len())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &VectorFilter,
    ) -> Result<Vec<VectorMatch>> {
        let map = self
            .records
            .read()
            .map_err(|e| StudioError::vector_store(e.to_string()))?;

        let mut matches: Vec<VectorMatch> = map
            .values()
            .filter(|r| filter.matches(&r.metadata))
            .map(|r| VectorMatch {
                id: r.id.clone(),
                score: cosine_similarity(vector, &r.values),
                metadata: r.metadata.clone(),
            })
            .collect();

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        matches.truncate(top_k);

        Ok(matches)
    }

    async fn delete_document(&self, document_id: &str) -> Result<()> {
        let mut map = self
            .records
            .write()
            .map_err(|e| StudioError::vector_store(e.to_string()))?;

        let before = map.len();
        map.retain(|_, r| r.metadata.document_id != document_id);
        debug!(
            "Deleted {} vectors for document {}",
            before - map.len(),
            document_id
        );
        Ok(())
    }

    async fn stats(&self) -> Result<IndexStats> {
        let map = self
            .records
            .read()
            .map_err(|e| StudioError::vector_store(e.to_string()))?;

        Ok(IndexStats {
            vector_count: map.len() as u64,
            dimension: map.values().next().map(|r| r.values.len()),
        })
    }
}
