//! studio-media - Sequential media generation jobs
//!
//! Image batches, content suites, scripted speech and blog outlines. Every job calls its
//! provider one request at a time through a [`studio_core::RetryPolicy`].

pub mod content;
pub mod cost;
pub mod images;
pub mod outline;
pub mod speech;

pub use content::{ContentStudio, ContentSuite, StageTimings, SuiteReport, DEFAULT_TOPIC};
pub use cost::CostTracker;
pub use images::{safe_theme, BatchReport, ImageBatch, ImageParams, ImageResult};
pub use outline::{ContentMode, OutlineJob};
pub use speech::{load_script, sample_conversation, DialogueLine, SpeechJob};
