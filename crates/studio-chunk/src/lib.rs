//! studio-chunk - Chunking strategies
//!
//! This crate splits extracted document text into overlapping,
//! size-bounded pieces for embedding.
//!
//! # Chunkers
//!
//! - [`RecursiveChunker`]: Recursively splits text using progressively smaller
//!   separators (paragraphs, lines, sentences, words, characters), merges the
//!   pieces up to the size bound and carries an overlap between chunks.
//!
//! # Example
//!
//! ```rust
//! use studio_chunk::{Chunker, RecursiveChunker};
//! use studio_core::ChunkConfig;
//!
//! let chunker = RecursiveChunker::new();
//! let chunks = chunker.chunk("Hello world", "notes.txt", &ChunkConfig::default()).unwrap();
//! assert_eq!(chunks[0].content(), "Document: notes\n\nHello world");
//! ```

mod recursive;

pub use recursive::{clean_text, context_prefix, RecursiveChunker, DEFAULT_SEPARATORS};

// Re-export types for convenience
pub use studio_core::{ChunkConfig, Chunk, Chunker};
