//! Themed image batches.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use studio_core::config::MediaConfig;
use studio_core::{now_millis, ChatModel, ChatPrompt, Result, RetryPolicy, StudioError};
use studio_providers::{ImageGenerator, ImageSize};

use crate::cost::CostTracker;

/// Request recorded with each result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageParams {
    pub model: String,
    pub size: String,
    pub prompt: String,
}

/// Outcome of one image in a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageResult {
    pub params: ImageParams,
    pub cost: f64,
    pub success: bool,
    /// Path relative to the batch directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revised_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Contents of `metadata.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub theme: String,
    pub enhanced_prompt: String,
    pub total_cost: f64,
    pub results: Vec<ImageResult>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }
}

/// Lowercased theme with every non-alphanumeric character replaced by `_`.
pub fn safe_theme(theme: &str) -> String {
    theme
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

fn enhancement_request(theme: &str) -> String {
    format!(
        "You are an expert prompt engineer for SDXL. Create a detailed, descriptive prompt \
         based on the user's theme. The prompt should be vivid and suitable for high-quality \
         image generation. Return ONLY the prompt text.\n\nTheme: {}\nPrompt:",
        theme
    )
}

/// Generates one image per configured size for a theme.
///
/// The theme is first rewritten into a detailed prompt. Images are then
/// requested strictly one after another, each preceded by the throttle
/// pause and retried on rate limits. A failed image is recorded in the
/// report; it does not stop the batch.
pub struct ImageBatch {
    prompt_model: Arc<dyn ChatModel>,
    images: Arc<dyn ImageGenerator>,
    sizes: Vec<ImageSize>,
    output_dir: PathBuf,
    throttle: Duration,
    retry: RetryPolicy,
    costs: CostTracker,
}

impl ImageBatch {
    pub fn new(
        prompt_model: Arc<dyn ChatModel>,
        images: Arc<dyn ImageGenerator>,
        config: &MediaConfig,
    ) -> Result<Self> {
        let sizes = config
            .image_sizes
            .iter()
            .map(|s| ImageSize::parse(s))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            prompt_model,
            images,
            sizes,
            output_dir: config.output_dir.clone(),
            throttle: Duration::from_secs(config.throttle_secs),
            retry: RetryPolicy::rate_limited(),
            costs: CostTracker::with_defaults(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_costs(mut self, costs: CostTracker) -> Self {
        self.costs = costs;
        self
    }

    /// Directory for today's batches: `<output>/<YYYY-MM-DD>`.
    pub fn batch_dir(&self) -> PathBuf {
        let date = chrono::Utc::now().format("%Y-%m-%d").to_string();
        self.output_dir.join(date)
    }

    /// Rewrite `theme` into an image prompt, falling back to the theme.
    pub async fn enhance_prompt(&self, theme: &str) -> String {
        let mut prompt = ChatPrompt::single(None, &enhancement_request(theme), 0.7);
        prompt.max_tokens = Some(200);

        match self
            .retry
            .run("enhance prompt", || self.prompt_model.complete(&prompt))
            .await
        {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                warn!("Prompt enhancement returned nothing, using the theme");
                theme.to_string()
            }
            Err(e) => {
                warn!("Prompt enhancement failed, using the theme: {}", e);
                theme.to_string()
            }
        }
    }

    /// Run the batch and write `metadata.json` into the batch directory.
    pub async fn run(&self, theme: &str) -> Result<BatchReport> {
        let theme = theme.trim();
        if theme.is_empty() {
            return Err(StudioError::invalid_argument("Please enter a theme."));
        }

        let mut costs = self.costs.reset();

        let enhanced_prompt = self.enhance_prompt(theme).await;
        costs.record(self.prompt_model.model());
        info!("Enhanced prompt: {}", enhanced_prompt);

        let batch_dir = self.batch_dir();
        let images_dir = batch_dir.join("images");
        tokio::fs::create_dir_all(&images_dir).await?;

        let mut results = Vec::with_capacity(self.sizes.len());
        for size in &self.sizes {
            info!(
                "Waiting {:?} before generating {} with {}",
                self.throttle,
                size,
                self.images.model()
            );
            tokio::time::sleep(self.throttle).await;

            let cost = costs.record(self.images.model());
            let result = self
                .generate_one(theme, &enhanced_prompt, *size, &images_dir, cost)
                .await;
            results.push(result);
        }

        let report = BatchReport {
            theme: theme.to_string(),
            enhanced_prompt,
            total_cost: costs.total(),
            results,
        };

        let metadata_path = batch_dir.join("metadata.json");
        tokio::fs::write(&metadata_path, serde_json::to_vec_pretty(&report)?).await?;

        info!(
            "Batch complete: {}/{} images, estimated cost ${:.4}, metadata at {}",
            report.succeeded(),
            report.results.len(),
            report.total_cost,
            metadata_path.display()
        );
        Ok(report)
    }

    async fn generate_one(
        &self,
        theme: &str,
        prompt: &str,
        size: ImageSize,
        images_dir: &Path,
        cost: f64,
    ) -> ImageResult {
        let params = ImageParams {
            model: self.images.model().to_string(),
            size: size.to_string(),
            prompt: prompt.to_string(),
        };

        let outcome = self
            .retry
            .run("generate image", || self.images.generate(prompt, size))
            .await;

        let saved = match outcome {
            Ok(image) => {
                let filename = format!("{}-{}-{}.png", safe_theme(theme), size, now_millis());
                let path = images_dir.join(&filename);
                tokio::fs::write(&path, &image.bytes)
                    .await
                    .map(|_| {
                        info!("Saved {}", path.display());
                        (filename, image.revised_prompt)
                    })
                    .map_err(StudioError::from)
            }
            Err(e) => Err(e),
        };

        match saved {
            Ok((filename, revised_prompt)) => ImageResult {
                params,
                cost,
                success: true,
                filename: Some(format!("images/{}", filename)),
                revised_prompt,
                error: None,
            },
            Err(e) => {
                error!("Image {} failed: {}", size, e);
                ImageResult {
                    params,
                    cost,
                    success: false,
                    filename: None,
                    revised_prompt: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}
