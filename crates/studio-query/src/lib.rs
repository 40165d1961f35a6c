//! studio-query - Retrieval and context assembly
//!
//! This crate turns a question about one document into a prompt context:
//! embed the question, fetch the most similar chunks of that document,
//! rerank them with a cross-encoder and render the best ones as numbered
//! sources.
//!
//! # Features
//!
//! - Document-scoped vector search
//! - Cohere reranking with fallback to similarity order
//! - Cited context rendering (`[Source 1]: ...`)
//! - Retrieval failures degrade to an empty context
//!
//! # Example
//!
//! ```rust,ignore
//! use studio_query::ContextAssembler;
//! use std::sync::Arc;
//!
//! let assembler = ContextAssembler::new(Arc::new(embedder), Arc::new(vectors));
//! let context = assembler.assemble("What was Q3 revenue?", &doc.id, &doc.title).await;
//! println!("{}", context.text);
//! ```

mod context;
mod rerank;

pub use context::{render_context, AssembledContext, ContextAssembler};
pub use rerank::{rerank_or_fallback, CohereReranker};

// Re-export for convenience
pub use studio_core::{ContextSource, RerankScore, Reranker};
