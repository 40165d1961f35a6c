//! Multi-modal content suites: article, visuals and narration per topic.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{error, info};

use studio_core::{ChatModel, ChatPrompt, Result, RetryPolicy, StudioError};
use studio_providers::{ImageGenerator, ImageSize, SpeechSynthesizer};

use crate::cost::CostTracker;
use crate::images::safe_theme;

/// Topic used when none is given.
pub const DEFAULT_TOPIC: &str = "The Future of Artificial General Intelligence";

const WRITER_SYSTEM: &str = "You are a professional content creator. Output ONLY valid JSON.";

const IMAGE_SIZE: ImageSize = ImageSize {
    width: 1024,
    height: 1024,
};

/// Written content for one topic, stored as `content.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentSuite {
    #[serde(default)]
    pub article: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub social_posts: Vec<String>,
}

impl ContentSuite {
    /// Placeholder content used when the writer fails.
    pub fn fallback(topic: &str) -> Self {
        Self {
            article: format!("Fallback article about {}.", topic),
            summary: format!("Summary of {}.", topic),
            social_posts: vec![format!("Post about {}", topic)],
        }
    }
}

/// Seconds spent in each stage that completed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageTimings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visuals: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<f64>,
}

/// Outcome of one topic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuiteReport {
    pub topic: String,
    pub output_dir: PathBuf,
    pub content: ContentSuite,
    /// Whether `content` is the placeholder.
    pub used_fallback: bool,
    /// Files written, relative to `output_dir`.
    pub files: Vec<String>,
    pub total_cost: f64,
    pub operations: u32,
    pub timings: StageTimings,
    pub duration_secs: f64,
}

fn writer_request(topic: &str) -> String {
    format!(
        "Create a content suite for: \"{}\".\n\
         Include:\n\
         1. A 500-word article.\n\
         2. A 2-sentence summary.\n\
         3. Three social media posts (Twitter, LinkedIn, Instagram).\n\
         Format: {{\"article\": \"...\", \"summary\": \"...\", \"socialPosts\": [\"...\", \"...\", \"...\"]}}",
        topic
    )
}

fn header_prompt(topic: &str, summary: &str) -> String {
    format!(
        "A professional cinematic header for an article about {}. Summary: {}. Style: Modern, clean.",
        topic, summary
    )
}

fn thumbnail_prompt(topic: &str) -> String {
    format!("A vibrant square thumbnail icon for {}. Minimalist.", topic)
}

fn secs(start: Instant) -> f64 {
    start.elapsed().as_secs_f64()
}

/// Produces an article, two images and a narration for each topic.
///
/// Stages run in order. A failed writer call falls back to placeholder
/// content; failed visuals or narration are logged and skipped. Every
/// provider call is retried on any failure, three attempts 2s apart.
pub struct ContentStudio {
    writer: Arc<dyn ChatModel>,
    images: Arc<dyn ImageGenerator>,
    speech: Arc<dyn SpeechSynthesizer>,
    output_dir: PathBuf,
    retry: RetryPolicy,
    costs: CostTracker,
}

impl ContentStudio {
    /// Studio writing to `<output_root>/content_suite/<slug>`.
    pub fn new(
        writer: Arc<dyn ChatModel>,
        images: Arc<dyn ImageGenerator>,
        speech: Arc<dyn SpeechSynthesizer>,
        output_root: &Path,
    ) -> Self {
        Self {
            writer,
            images,
            speech,
            output_dir: output_root.join("content_suite"),
            retry: RetryPolicy::fixed(3, Duration::from_secs(2)),
            costs: CostTracker::with_defaults(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_costs(mut self, costs: CostTracker) -> Self {
        self.costs = costs;
        self
    }

    /// Output directory for a topic.
    pub fn topic_dir(&self, topic: &str) -> PathBuf {
        self.output_dir.join(safe_theme(topic))
    }

    /// Run every stage for one topic.
    pub async fn run(&self, topic: &str) -> Result<SuiteReport> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(StudioError::invalid_argument("Topic is required"));
        }

        let start = Instant::now();
        let dir = self.topic_dir(topic);
        tokio::fs::create_dir_all(&dir).await?;
        info!("Content studio started for: {}", topic);

        let mut costs = self.costs.reset();
        let mut timings = StageTimings::default();
        let mut files = Vec::new();

        let text_start = Instant::now();
        let (content, used_fallback) = match self.write_content(topic).await {
            Ok(content) => {
                costs.record(self.writer.model());
                timings.text = Some(secs(text_start));
                (content, false)
            }
            Err(e) => {
                error!("Content generation failed, using placeholder: {}", e);
                (ContentSuite::fallback(topic), true)
            }
        };
        tokio::fs::write(dir.join("content.json"), serde_json::to_vec_pretty(&content)?).await?;
        files.push("content.json".to_string());

        let visuals_start = Instant::now();
        match self
            .generate_visuals(topic, &content.summary, &dir, &mut costs, &mut files)
            .await
        {
            Ok(()) => timings.visuals = Some(secs(visuals_start)),
            Err(e) => error!("Visuals failed: {}", e),
        }

        let audio_start = Instant::now();
        match self.narrate(&content.summary, &dir).await {
            Ok(filename) => {
                costs.record(self.speech.model());
                timings.audio = Some(secs(audio_start));
                files.push(filename);
            }
            Err(e) => error!("Narration failed: {}", e),
        }

        let report = SuiteReport {
            topic: topic.to_string(),
            output_dir: dir,
            content,
            used_fallback,
            files,
            total_cost: costs.total(),
            operations: costs.operations(),
            timings,
            duration_secs: secs(start),
        };

        info!(
            "Content suite for {}: {:.2}s, estimated cost ${:.4}, {} operations, timings {:?}, output {}",
            report.topic,
            report.duration_secs,
            report.total_cost,
            report.operations,
            report.timings,
            report.output_dir.display()
        );
        Ok(report)
    }

    /// Run topics one after another.
    pub async fn run_batch(&self, topics: &[String]) -> Result<Vec<SuiteReport>> {
        info!("Starting batch for {} topics", topics.len());
        let mut reports = Vec::with_capacity(topics.len());
        for topic in topics {
            reports.push(self.run(topic).await?);
        }
        info!("Batch complete");
        Ok(reports)
    }

    async fn write_content(&self, topic: &str) -> Result<ContentSuite> {
        let prompt = ChatPrompt::single(Some(WRITER_SYSTEM), &writer_request(topic), 0.7)
            .with_json_output();
        let raw = self
            .retry
            .run("generate content", || self.writer.complete(&prompt))
            .await?;
        Ok(serde_json::from_str(raw.trim())?)
    }

    async fn generate_visuals(
        &self,
        topic: &str,
        summary: &str,
        dir: &Path,
        costs: &mut CostTracker,
        files: &mut Vec<String>,
    ) -> Result<()> {
        let shots = [
            ("header.png", header_prompt(topic, summary)),
            ("thumbnail.png", thumbnail_prompt(topic)),
        ];
        for (filename, prompt) in &shots {
            let image = self
                .retry
                .run("generate image", || self.images.generate(prompt, IMAGE_SIZE))
                .await?;
            tokio::fs::write(dir.join(filename), &image.bytes).await?;
            costs.record(self.images.model());
            files.push(filename.to_string());
            info!("Saved {}", filename);
        }
        Ok(())
    }

    async fn narrate(&self, text: &str, dir: &Path) -> Result<String> {
        let audio = self
            .retry
            .run("synthesize narration", || self.speech.synthesize(text))
            .await?;
        let filename = format!("narration.{}", self.speech.audio_extension());
        tokio::fs::write(dir.join(&filename), audio).await?;
        Ok(filename)
    }
}
