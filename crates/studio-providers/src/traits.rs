//! Interfaces for the media and ingestion providers.

use async_trait::async_trait;
use serde_json::Value;

use studio_core::{Result, StudioError};

/// Output image dimensions, written `WIDTHxHEIGHT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn parse(s: &str) -> Result<Self> {
        let (w, h) = s
            .split_once('x')
            .ok_or_else(|| StudioError::invalid_argument(format!("Invalid image size: {}", s)))?;
        let parse = |v: &str| {
            v.trim()
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| StudioError::invalid_argument(format!("Invalid image size: {}", s)))
        };
        Ok(Self {
            width: parse(w)?,
            height: parse(h)?,
        })
    }
}

impl std::fmt::Display for ImageSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A generated image.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedImage {
    /// Encoded image (PNG for the supported models).
    pub bytes: Vec<u8>,

    /// Prompt the provider actually used, when it rewrote ours.
    pub revised_prompt: Option<String>,
}

/// Text-to-image model.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    fn model(&self) -> &str;

    async fn generate(&self, prompt: &str, size: ImageSize) -> Result<GeneratedImage>;
}

/// Text-to-speech model.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    fn model(&self) -> &str;

    /// File extension of the produced audio.
    fn audio_extension(&self) -> &str;

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;
}

/// Source of video transcripts.
#[async_trait]
pub trait TranscriptSource: Send + Sync {
    /// Full transcript text for a video id.
    async fn fetch_transcript(&self, video_id: &str) -> Result<String>;
}

/// Durable-workflow event intake.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Send one event; returns the ids assigned by the platform.
    async fn send(&self, name: &str, data: Value) -> Result<Vec<String>>;
}
