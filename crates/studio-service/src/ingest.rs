//! Chunk, embed and index extracted text.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use studio_core::{
    ChunkConfig, Chunker, Document, Embedder, Result, StudioError, VectorMetadata, VectorRecord,
    VectorStore,
};

/// Counts produced by indexing one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexOutcome {
    pub chunk_count: u32,
    pub vector_count: u32,
    pub content_length: u64,
}

/// Turns document text into stored vectors.
pub struct Indexer {
    chunker: Arc<dyn Chunker>,
    embedder: Arc<dyn Embedder>,
    vectors: Arc<dyn VectorStore>,
    config: ChunkConfig,
}

impl Indexer {
    pub fn new(
        chunker: Arc<dyn Chunker>,
        embedder: Arc<dyn Embedder>,
        vectors: Arc<dyn VectorStore>,
        config: ChunkConfig,
    ) -> Self {
        Self {
            chunker,
            embedder,
            vectors,
            config,
        }
    }

    /// Index `content` as the chunks of `doc`, named after `source_name`.
    ///
    /// Fails with `empty_message` when the text yields no chunks.
    pub async fn index(
        &self,
        doc: &Document,
        source_name: &str,
        content: &str,
        empty_message: &str,
    ) -> Result<IndexOutcome> {
        let start = Instant::now();

        let chunks = self.chunker.chunk(content, source_name, &self.config)?;
        if chunks.is_empty() {
            return Err(StudioError::invalid_argument(empty_message));
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content()).collect();
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let embeddings = self.embedder.embed_documents(&refs).await?;

        if embeddings.len() != chunks.len() {
            return Err(StudioError::embedding(format!(
                "Expected {} embeddings, got {}",
                chunks.len(),
                embeddings.len()
            )));
        }
        debug!("Embedded {} chunks for {}", chunks.len(), doc.id);

        let records: Vec<VectorRecord> = chunks
            .iter()
            .zip(texts)
            .zip(embeddings)
            .map(|((chunk, content), values)| VectorRecord {
                id: VectorRecord::id_for(&doc.id, chunk.index),
                values,
                metadata: VectorMetadata {
                    document_id: doc.id.clone(),
                    chunk_index: chunk.index,
                    content,
                    title: doc.title.clone(),
                    filename: doc.filename.clone(),
                    file_type: doc.file_type.as_str().to_string(),
                },
            })
            .collect();

        let vector_count = self.vectors.upsert(&records).await?;

        info!(
            "Indexed {} ({} chunks, {} vectors) in {:?}",
            doc.id,
            chunks.len(),
            vector_count,
            start.elapsed()
        );

        Ok(IndexOutcome {
            chunk_count: chunks.len() as u32,
            vector_count: vector_count as u32,
            content_length: content.chars().count() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use studio_chunk::RecursiveChunker;
    use studio_core::{FileType, VectorFilter};
    use studio_embed::HashingEmbedder;
    use studio_store::InMemoryVectorStore;

    fn indexer(vectors: Arc<InMemoryVectorStore>) -> Indexer {
        Indexer::new(
            Arc::new(RecursiveChunker::new()),
            Arc::new(HashingEmbedder::new(256)),
            vectors,
            ChunkConfig {
                chunk_size: 60,
                chunk_overlap: 0,
            },
        )
    }

    #[tokio::test]
    async fn test_index_builds_records() {
        let vectors = Arc::new(InMemoryVectorStore::new());
        let doc = Document::new("notes", "notes.txt", FileType::Txt, 120);
        let content = "First paragraph about tides and oceans.\n\nSecond paragraph about volcanic islands.";

        let outcome = indexer(vectors.clone())
            .index(&doc, "notes.txt", content, "empty")
            .await
            .unwrap();

        assert_eq!(outcome.chunk_count, 2);
        assert_eq!(outcome.vector_count, 2);
        assert_eq!(outcome.content_length, content.chars().count() as u64);

        let query = HashingEmbedder::new(256).embed("volcanic islands");
        let hits = vectors
            .query(&query, 5, &VectorFilter::document(&doc.id))
            .await
            .unwrap();
        assert_eq!(hits[0].id, format!("{}-chunk-1", doc.id));
        assert!(hits[0].metadata.content.starts_with("Document: notes\n\n"));
        assert_eq!(hits[0].metadata.file_type, "txt");
    }

    #[tokio::test]
    async fn test_index_rejects_empty_text() {
        let vectors = Arc::new(InMemoryVectorStore::new());
        let doc = Document::new("blank", "blank.md", FileType::Md, 3);

        let err = indexer(vectors.clone())
            .index(&doc, "blank.md", "  \n ", "No content could be extracted from the file.")
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), 400);
        assert!(err.to_string().contains("No content could be extracted"));
        assert!(vectors.is_empty());
    }
}
