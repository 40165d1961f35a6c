//! studio-core - Core types and traits for genai-studio
//!
//! This crate provides the foundational types, traits, error handling and
//! retry policy used by every other studio crate.

pub mod config;
pub mod error;
pub mod http;
pub mod retry;
pub mod traits;
pub mod types;

pub use config::*;
pub use error::{StudioError, Result};
pub use retry::{RetryOn, RetryPolicy, Retryable};
pub use traits::*;
pub use types::*;
