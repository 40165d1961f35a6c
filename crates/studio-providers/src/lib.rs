//! studio-providers - Hosted model, workflow and transcript clients
//!
//! Chat, image and speech adapters for OpenAI and Replicate, the workflow
//! event client and the YouTube transcript scraper. Every client maps HTTP
//! failures through `studio_core::http`, so rate limits surface as
//! retryable `StudioError::RateLimited`.

pub mod openai;
pub mod replicate;
pub mod sse;
pub mod traits;
pub mod workflow;
pub mod youtube;

pub use openai::{OpenAiChat, OpenAiConfig, OpenAiImages, OpenAiSpeech};
pub use replicate::{ReplicateChat, ReplicateClient, ReplicateImages, ReplicateSpeech};
pub use traits::{
    EventSink, GeneratedImage, ImageGenerator, ImageSize, SpeechSynthesizer, TranscriptSource,
};
pub use workflow::WorkflowClient;
pub use youtube::{extract_video_id, video_title, YouTubeTranscripts};
