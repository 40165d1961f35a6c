//! studio-embed - Text embedding clients
//!
//! This crate turns chunk and query text into dense vectors.
//!
//! # Embedders
//!
//! - [`OpenAiEmbedder`]: OpenAI-compatible `/embeddings` endpoint, batched,
//!   with rate-limit aware retries
//! - [`HashingEmbedder`]: Offline feature-hashing embedder for tests and
//!   runs without an API key

mod hashing;
mod openai;

pub use hashing::HashingEmbedder;
pub use openai::OpenAiEmbedder;

// Re-export the Embedder trait for convenience
pub use studio_core::Embedder;
