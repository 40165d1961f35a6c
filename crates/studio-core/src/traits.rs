//! Core traits defining the interfaces between components.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{
    ChatPrompt, Chunk, Document, DocumentUpdate, IndexStats, Message, Stats, VectorFilter,
    VectorMatch, VectorRecord,
};

/// Document and conversation persistence.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    // Document operations
    async fn insert_document(&self, doc: Document) -> Result<()>;
    async fn get_document(&self, id: &str) -> Result<Option<Document>>;
    async fn list_documents(&self) -> Result<Vec<Document>>;
    async fn update_document(&self, id: &str, update: DocumentUpdate) -> Result<Document>;
    async fn delete_document(&self, id: &str) -> Result<()>;

    // Conversation operations
    async fn append_messages(&self, conversation_id: &str, messages: &[Message]) -> Result<()>;
    async fn load_messages(&self, conversation_id: &str) -> Result<Vec<Message>>;
    async fn delete_conversation(&self, conversation_id: &str) -> Result<u64>;

    // Stats
    async fn get_stats(&self) -> Result<Stats>;
}

/// Hosted (or offline) embedding model.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, one vector per input, in order.
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query text.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// Get the embedding dimension.
    fn dimension(&self) -> usize;
}

/// Managed vector index.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace records; returns how many were written.
    async fn upsert(&self, records: &[VectorRecord]) -> Result<usize>;

    /// Top-`top_k` most similar records passing `filter`, best first.
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &VectorFilter,
    ) -> Result<Vec<VectorMatch>>;

    /// Remove every vector belonging to a document.
    async fn delete_document(&self, document_id: &str) -> Result<()>;

    /// Index statistics.
    async fn stats(&self) -> Result<IndexStats>;
}

/// Relevance of one candidate after reranking.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RerankScore {
    /// Position in the candidate list that was sent.
    pub index: usize,

    /// Relevance to the query (higher is better).
    pub relevance: f32,
}

/// Cross-encoder reranking service.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Reorder `documents` by relevance to `query`, best first.
    async fn rerank(&self, query: &str, documents: &[&str]) -> Result<Vec<RerankScore>>;
}

/// Callback receiving each streamed text fragment.
pub type DeltaFn = dyn for<'a> Fn(&'a str) + Send + Sync;

/// Chat completion model.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Model identifier, for logs and cost tracking.
    fn model(&self) -> &str;

    /// Complete a prompt in one response.
    async fn complete(&self, prompt: &ChatPrompt) -> Result<String>;

    /// Stream a completion, calling `on_delta` for each text fragment.
    /// Returns the full text once the stream ends.
    async fn stream(
        &self,
        prompt: &ChatPrompt,
        on_delta: &DeltaFn,
    ) -> Result<String>;
}

/// Chunking configuration.
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// Maximum characters per chunk (prefix excluded).
    pub chunk_size: usize,

    /// Characters shared between consecutive chunks.
    pub chunk_overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 2000,
            chunk_overlap: 400,
        }
    }
}

/// Chunking strategy trait.
pub trait Chunker: Send + Sync {
    /// Split `content` into chunks prefixed with `source_name`.
    fn chunk(&self, content: &str, source_name: &str, config: &ChunkConfig) -> Result<Vec<Chunk>>;
}
