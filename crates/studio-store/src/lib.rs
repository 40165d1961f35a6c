//! studio-store - Storage layer
//!
//! This crate provides persistent storage for documents and conversations
//! using SQLite, and clients for the vector index that holds chunk
//! embeddings.
//!
//! - [`SqliteStore`]: documents and chat messages
//! - [`PineconeStore`]: managed vector index over HTTPS
//! - [`InMemoryVectorStore`]: cosine-similarity index kept in process

mod memory;
mod pinecone;
mod schema;
mod sqlite;

pub use memory::InMemoryVectorStore;
pub use pinecone::PineconeStore;
pub use sqlite::SqliteStore;

// Re-export schema for testing/migrations
pub use schema::SCHEMA;
