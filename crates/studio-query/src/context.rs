//! Context assembly for document chat.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use studio_core::config::RerankConfig;
use studio_core::{ContextSource, Embedder, Reranker, Result, VectorFilter, VectorStore};

use crate::rerank::rerank_or_fallback;

/// Retrieval context for one question.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssembledContext {
    /// Rendered context for the system prompt; empty when nothing was found.
    pub text: String,

    /// Sources in citation order (`[Source 1]` first).
    pub sources: Vec<ContextSource>,
}

impl AssembledContext {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Builds prompt contexts from a document's indexed chunks.
///
/// Vector search fetches `initial_results` candidates restricted to the
/// document, the reranker reorders them and the best `final_results` are
/// rendered as numbered sources.
pub struct ContextAssembler {
    embedder: Arc<dyn Embedder>,
    vectors: Arc<dyn VectorStore>,
    reranker: Option<Arc<dyn Reranker>>,
    initial_results: usize,
    final_results: usize,
}

impl ContextAssembler {
    /// Create an assembler without reranking, with default limits (20 -> 10).
    pub fn new(embedder: Arc<dyn Embedder>, vectors: Arc<dyn VectorStore>) -> Self {
        Self {
            embedder,
            vectors,
            reranker: None,
            initial_results: 20,
            final_results: 10,
        }
    }

    /// Create an assembler using the limits from configuration.
    pub fn from_config(
        embedder: Arc<dyn Embedder>,
        vectors: Arc<dyn VectorStore>,
        reranker: Option<Arc<dyn Reranker>>,
        config: &RerankConfig,
    ) -> Self {
        Self::new(embedder, vectors)
            .with_reranker(reranker.filter(|_| config.enabled))
            .with_limits(config.initial_results, config.final_results)
    }

    pub fn with_reranker(mut self, reranker: Option<Arc<dyn Reranker>>) -> Self {
        self.reranker = reranker;
        self
    }

    pub fn with_limits(mut self, initial_results: usize, final_results: usize) -> Self {
        self.initial_results = initial_results.max(1);
        self.final_results = final_results.max(1);
        self
    }

    /// Assemble the context for `query` against one document.
    ///
    /// Never fails: retrieval errors are logged and yield an empty context.
    pub async fn assemble(&self, query: &str, document_id: &str, title: &str) -> AssembledContext {
        if query.trim().is_empty() {
            return AssembledContext::empty();
        }

        let start = Instant::now();

        let candidates = match self.retrieve(query, document_id, title).await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!("Retrieval failed for document {}: {}", document_id, e);
                return AssembledContext::empty();
            }
        };

        if candidates.is_empty() {
            debug!("No indexed chunks for document {}", document_id);
            return AssembledContext::empty();
        }

        let mut sources = rerank_or_fallback(self.reranker.as_deref(), query, candidates).await;
        sources.truncate(self.final_results);

        info!(
            "Assembled context from {} sources in {:?}",
            sources.len(),
            start.elapsed()
        );

        AssembledContext {
            text: render_context(title, &sources),
            sources,
        }
    }

    /// Embed the query and fetch the document's most similar chunks.
    async fn retrieve(
        &self,
        query: &str,
        document_id: &str,
        title: &str,
    ) -> Result<Vec<ContextSource>> {
        let embedding = self.embedder.embed_query(query).await?;
        let matches = self
            .vectors
            .query(&embedding, self.initial_results, &VectorFilter::document(document_id))
            .await?;

        debug!("Vector search returned {} matches", matches.len());

        Ok(matches
            .into_iter()
            .map(|m| ContextSource {
                document_id: m.metadata.document_id,
                document_title: if m.metadata.title.is_empty() {
                    title.to_string()
                } else {
                    m.metadata.title
                },
                chunk_id: m.id,
                content: m.metadata.content,
                similarity: m.score,
            })
            .collect())
    }
}

/// Render sources as `[Source i]: <content>` blocks under the title header.
pub fn render_context(title: &str, sources: &[ContextSource]) -> String {
    if sources.is_empty() {
        return String::new();
    }

    let chunks = sources
        .iter()
        .enumerate()
        .map(|(i, source)| {
            let content = if source.content.is_empty() {
                "No content available"
            } else {
                source.content.as_str()
            };
            format!("[Source {}]: {}", i + 1, content)
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "You have access to content from: {}\n\nContext:\n{}",
        title, chunks
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use studio_chunk::{ChunkConfig, Chunker, RecursiveChunker};
    use studio_core::{RerankScore, StudioError, VectorMetadata, VectorRecord};
    use studio_embed::HashingEmbedder;
    use studio_store::InMemoryVectorStore;

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed_documents(&self, _texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            Err(StudioError::embedding("offline"))
        }

        async fn embed_query(&self, _text: &str) -> Result<Vec<f32>> {
            Err(StudioError::embedding("offline"))
        }

        fn dimension(&self) -> usize {
            8
        }
    }

    struct FailingReranker;

    #[async_trait]
    impl Reranker for FailingReranker {
        async fn rerank(&self, _query: &str, _documents: &[&str]) -> Result<Vec<RerankScore>> {
            Err(StudioError::rerank("service unavailable"))
        }
    }

    /// Index `text` for `document_id` the way uploads do.
    async fn index(
        embedder: &HashingEmbedder,
        vectors: &InMemoryVectorStore,
        document_id: &str,
        filename: &str,
        text: &str,
        config: &ChunkConfig,
    ) -> usize {
        let chunks = RecursiveChunker::new().chunk(text, filename, config).unwrap();
        let contents: Vec<String> = chunks.iter().map(|c| c.content()).collect();
        let refs: Vec<&str> = contents.iter().map(|s| s.as_str()).collect();
        let embeddings = embedder.embed_documents(&refs).await.unwrap();

        let records: Vec<VectorRecord> = chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, values)| VectorRecord {
                id: VectorRecord::id_for(document_id, chunk.index),
                values,
                metadata: VectorMetadata {
                    document_id: document_id.to_string(),
                    chunk_index: chunk.index,
                    content: chunk.content(),
                    title: studio_core::strip_extension(filename).to_string(),
                    filename: filename.to_string(),
                    file_type: "txt".to_string(),
                },
            })
            .collect();
        vectors.upsert(&records).await.unwrap()
    }

    const THREE_TOPICS: &str = "Volcanoes erupt molten lava from magma chambers deep underground.\n\n\
         Honeybees pollinate orchards and produce honey inside wax combs.\n\n\
         Glaciers carve valleys as compacted ice slowly flows downhill.";

    fn paragraph_config() -> ChunkConfig {
        ChunkConfig {
            chunk_size: 80,
            chunk_overlap: 0,
        }
    }

    #[tokio::test]
    async fn test_matching_chunk_ranks_first() {
        let embedder = Arc::new(HashingEmbedder::new(512));
        let vectors = Arc::new(InMemoryVectorStore::new());
        let stored = index(
            &embedder,
            &vectors,
            "doc-nature",
            "nature.txt",
            THREE_TOPICS,
            &paragraph_config(),
        )
        .await;
        assert_eq!(stored, 3);

        let assembler = ContextAssembler::new(embedder, vectors);
        let context = assembler
            .assemble("How do honeybees produce honey?", "doc-nature", "nature")
            .await;

        assert_eq!(context.sources.len(), 3);
        assert_eq!(context.sources[0].chunk_id, "doc-nature-chunk-1");
        assert!(context
            .text
            .starts_with("You have access to content from: nature\n\nContext:\n[Source 1]: Document: nature\n\nHoneybees"));
    }

    #[tokio::test]
    async fn test_zero_vectors_gives_empty_context() {
        let embedder = Arc::new(HashingEmbedder::new(64));
        let vectors = Arc::new(InMemoryVectorStore::new());
        index(
            &embedder,
            &vectors,
            "doc-other",
            "other.txt",
            THREE_TOPICS,
            &paragraph_config(),
        )
        .await;

        let assembler = ContextAssembler::new(embedder, vectors);
        let context = assembler.assemble("volcano lava", "doc-empty", "empty").await;

        assert!(context.is_empty());
        assert!(context.sources.is_empty());
    }

    #[tokio::test]
    async fn test_retrieval_failure_gives_empty_context() {
        let vectors = Arc::new(InMemoryVectorStore::new());
        let assembler = ContextAssembler::new(Arc::new(FailingEmbedder), vectors);

        let context = assembler.assemble("anything", "doc-1", "title").await;
        assert_eq!(context, AssembledContext::empty());
    }

    #[tokio::test]
    async fn test_rerank_failure_keeps_similarity_order() {
        let embedder = Arc::new(HashingEmbedder::new(512));
        let vectors = Arc::new(InMemoryVectorStore::new());
        index(
            &embedder,
            &vectors,
            "doc-nature",
            "nature.txt",
            THREE_TOPICS,
            &paragraph_config(),
        )
        .await;

        let plain = ContextAssembler::new(embedder.clone(), vectors.clone());
        let with_failing = ContextAssembler::new(embedder, vectors)
            .with_reranker(Some(Arc::new(FailingReranker)));

        let expected = plain.assemble("glaciers and ice", "doc-nature", "nature").await;
        let actual = with_failing
            .assemble("glaciers and ice", "doc-nature", "nature")
            .await;

        assert_eq!(actual, expected);
        assert_eq!(actual.sources.len(), 3);
    }

    #[tokio::test]
    async fn test_final_results_limit() {
        let embedder = Arc::new(HashingEmbedder::new(256));
        let vectors = Arc::new(InMemoryVectorStore::new());
        index(
            &embedder,
            &vectors,
            "doc-nature",
            "nature.txt",
            THREE_TOPICS,
            &paragraph_config(),
        )
        .await;

        let assembler = ContextAssembler::new(embedder, vectors).with_limits(20, 2);
        let context = assembler.assemble("ice", "doc-nature", "nature").await;

        assert_eq!(context.sources.len(), 2);
        assert!(context.text.contains("[Source 2]: "));
        assert!(!context.text.contains("[Source 3]: "));
    }

    #[test]
    fn test_render_context() {
        let sources = vec![
            ContextSource {
                document_id: "d".to_string(),
                document_title: "Report".to_string(),
                chunk_id: "d-chunk-0".to_string(),
                content: "First".to_string(),
                similarity: 0.9,
            },
            ContextSource {
                document_id: "d".to_string(),
                document_title: "Report".to_string(),
                chunk_id: "d-chunk-1".to_string(),
                content: String::new(),
                similarity: 0.8,
            },
        ];

        assert_eq!(
            render_context("Report", &sources),
            "You have access to content from: Report\n\nContext:\n[Source 1]: First\n\n[Source 2]: No content available"
        );
        assert_eq!(render_context("Report", &[]), "");
    }
}
