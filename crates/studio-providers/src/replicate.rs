//! Replicate predictions client and the model adapters built on it.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use studio_core::http::{check_response, client, read_json, transport_error};
use studio_core::{ChatModel, ChatPrompt, DeltaFn, Result, Role, StudioError};

use crate::sse::SseDecoder;
use crate::traits::{GeneratedImage, ImageGenerator, ImageSize, SpeechSynthesizer};

const PROVIDER: &str = "replicate";
const DEFAULT_BASE_URL: &str = "https://api.replicate.com";
const POLL_INTERVAL: Duration = Duration::from_secs(1);
const MAX_POLLS: u32 = 600;

/// A prediction as returned by the API.
#[derive(Debug, Clone, Deserialize)]
pub struct Prediction {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub output: Value,
    #[serde(default)]
    pub error: Value,
    #[serde(default)]
    pub urls: PredictionUrls,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PredictionUrls {
    pub get: Option<String>,
    pub stream: Option<String>,
}

impl Prediction {
    fn is_terminal(&self) -> bool {
        matches!(self.status.as_str(), "succeeded" | "failed" | "canceled")
    }
}

/// Thin client for `/v1/predictions`.
#[derive(Clone)]
pub struct ReplicateClient {
    http: Client,
    base_url: String,
    api_token: String,
}

/// Where a prediction for `model` is created, and the body to send.
///
/// `owner/name:version` uses the versioned endpoint; `owner/name` the
/// model's deployment endpoint.
fn prediction_request(model: &str, input: Value, stream: bool) -> (String, Value) {
    match model.split_once(':') {
        Some((_, version)) => (
            "/v1/predictions".to_string(),
            json!({ "version": version, "input": input, "stream": stream }),
        ),
        None => (
            format!("/v1/models/{}/predictions", model),
            json!({ "input": input, "stream": stream }),
        ),
    }
}

/// Every URL in a prediction output (single string or list).
pub fn output_urls(output: &Value) -> Vec<String> {
    match output {
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect(),
        _ => Vec::new(),
    }
}

/// Text output, joining token lists.
pub fn output_text(output: &Value) -> String {
    match output {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().filter_map(|v| v.as_str()).collect(),
        _ => String::new(),
    }
}

impl ReplicateClient {
    pub fn new(api_token: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http: client(Duration::from_secs(300))?,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_token: api_token.into(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn auth(&self) -> String {
        format!("Bearer {}", self.api_token)
    }

    async fn create(&self, model: &str, input: Value, stream: bool) -> Result<Prediction> {
        let (path, body) = prediction_request(model, input, stream);
        let mut request = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .header("Authorization", self.auth())
            .json(&body);
        if !stream {
            request = request.header("Prefer", "wait");
        }

        let resp = request
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;
        let resp = check_response(PROVIDER, resp).await?;
        read_json(PROVIDER, resp).await
    }

    async fn get(&self, url: &str) -> Result<Prediction> {
        let resp = self
            .http
            .get(url)
            .header("Authorization", self.auth())
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;
        let resp = check_response(PROVIDER, resp).await?;
        read_json(PROVIDER, resp).await
    }

    /// Run a model to completion and return its output.
    pub async fn run(&self, model: &str, input: Value) -> Result<Value> {
        let mut prediction = self.create(model, input, false).await?;

        let mut polls = 0;
        while !prediction.is_terminal() {
            let url = prediction.urls.get.clone().ok_or_else(|| {
                StudioError::transport(PROVIDER, "prediction has no status URL")
            })?;
            if polls >= MAX_POLLS {
                return Err(StudioError::transport(
                    PROVIDER,
                    format!("prediction {} did not finish", prediction.id),
                ));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
            prediction = self.get(&url).await?;
            polls += 1;
        }

        finish(prediction)
    }

    /// Run a model with streaming output, reporting each text fragment.
    pub async fn stream(
        &self,
        model: &str,
        input: Value,
        on_delta: &DeltaFn,
    ) -> Result<String> {
        let prediction = self.create(model, input, true).await?;
        let url = prediction
            .urls
            .stream
            .ok_or_else(|| StudioError::transport(PROVIDER, "model does not support streaming"))?;

        let resp = self
            .http
            .get(&url)
            .header("Accept", "text/event-stream")
            .header("Cache-Control", "no-store")
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;
        let resp = check_response(PROVIDER, resp).await?;

        let mut full = String::new();
        let mut decoder = SseDecoder::new();
        let mut stream = resp.bytes_stream();

        'outer: while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| transport_error(PROVIDER, e))?;
            for event in decoder.push(&String::from_utf8_lossy(&chunk)) {
                match event.event.as_str() {
                    "output" => {
                        on_delta(&event.data);
                        full.push_str(&event.data);
                    }
                    "error" => {
                        return Err(StudioError::Upstream {
                            provider: PROVIDER.to_string(),
                            status: None,
                            message: event.data,
                        });
                    }
                    "done" => break 'outer,
                    _ => {}
                }
            }
        }

        Ok(full)
    }

    /// Download a file produced by a prediction.
    pub async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;
        let resp = check_response(PROVIDER, resp).await?;
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;
        debug!("Downloaded {} bytes from {}", bytes.len(), url);
        Ok(bytes.to_vec())
    }
}

fn finish(prediction: Prediction) -> Result<Value> {
    match prediction.status.as_str() {
        "succeeded" => Ok(prediction.output),
        status => {
            let reason = match &prediction.error {
                Value::String(s) => s.clone(),
                Value::Null => format!("prediction {}", status),
                other => other.to_string(),
            };
            // Rate limits surfaced inside a failed prediction keep their hint
            if reason.contains("retry_after") {
                return Err(StudioError::from_status(PROVIDER, 429, None, reason));
            }
            Err(StudioError::Upstream {
                provider: PROVIDER.to_string(),
                status: None,
                message: format!("prediction {} {}: {}", prediction.id, status, reason),
            })
        }
    }
}

/// Render a chat prompt in the instruct-model transcript format.
pub fn instruct_prompt(prompt: &ChatPrompt) -> String {
    let mut text = String::new();
    if let Some(system) = &prompt.system {
        text.push_str(system);
        text.push_str("\n\n");
    }
    for turn in &prompt.turns {
        let speaker = match turn.role {
            Role::User => "User",
            Role::Assistant => "Assistant",
        };
        text.push_str(&format!("{}: {}\n", speaker, turn.content));
    }
    text.push_str("Assistant:");
    text
}

// ---------------------------------------------------------------------------
// Model adapters
// ---------------------------------------------------------------------------

/// Instruct language model (e.g. Llama 3) as a chat model.
pub struct ReplicateChat {
    client: ReplicateClient,
    model: String,
}

impl ReplicateChat {
    pub fn new(client: ReplicateClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    fn input(&self, prompt: &ChatPrompt) -> Value {
        json!({
            "prompt": instruct_prompt(prompt),
            "temperature": prompt.temperature,
            "max_tokens": prompt.max_tokens.unwrap_or(1000),
        })
    }
}

#[async_trait]
impl ChatModel for ReplicateChat {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &ChatPrompt) -> Result<String> {
        let output = self.client.run(&self.model, self.input(prompt)).await?;
        Ok(output_text(&output).trim().to_string())
    }

    async fn stream(
        &self,
        prompt: &ChatPrompt,
        on_delta: &DeltaFn,
    ) -> Result<String> {
        self.client
            .stream(&self.model, self.input(prompt), on_delta)
            .await
    }
}

/// SDXL-style image model.
pub struct ReplicateImages {
    client: ReplicateClient,
    model: String,
}

impl ReplicateImages {
    pub fn new(client: ReplicateClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

fn sdxl_input(prompt: &str, size: ImageSize) -> Value {
    json!({
        "prompt": prompt,
        "width": size.width,
        "height": size.height,
        "refine": "expert_ensemble_refiner",
        "scheduler": "K_EULER",
        "num_outputs": 1,
        "guidance_scale": 7.5,
        "apply_watermark": false,
        "high_noise_frac": 0.8,
        "num_inference_steps": 50,
    })
}

#[async_trait]
impl ImageGenerator for ReplicateImages {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, size: ImageSize) -> Result<GeneratedImage> {
        info!("Generating {} image with {}", size, self.model);
        let output = self.client.run(&self.model, sdxl_input(prompt, size)).await?;
        let url = output_urls(&output)
            .into_iter()
            .next()
            .ok_or_else(|| StudioError::transport(PROVIDER, "image prediction returned no output"))?;

        Ok(GeneratedImage {
            bytes: self.client.download(&url).await?,
            revised_prompt: Some(prompt.to_string()),
        })
    }
}

/// XTTS-style voice-cloning speech model, producing WAV.
pub struct ReplicateSpeech {
    client: ReplicateClient,
    model: String,
    speaker_voice: String,
}

impl ReplicateSpeech {
    pub fn new(client: ReplicateClient, model: impl Into<String>, speaker_voice: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            speaker_voice: speaker_voice.into(),
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for ReplicateSpeech {
    fn model(&self) -> &str {
        &self.model
    }

    fn audio_extension(&self) -> &str {
        "wav"
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let input = json!({
            "text": text,
            "speaker": self.speaker_voice,
            "language": "en",
            "cleanup_voice": true,
        });
        let output = self.client.run(&self.model, input).await?;
        let url = output_urls(&output)
            .into_iter()
            .next()
            .ok_or_else(|| StudioError::transport(PROVIDER, "speech prediction returned no audio"))?;
        self.client.download(&url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use studio_core::{ChatTurn, Retryable};

    #[test]
    fn test_versioned_prediction_request() {
        let (path, body) = prediction_request(
            "stability-ai/sdxl:7762fd07",
            json!({ "prompt": "fox" }),
            false,
        );
        assert_eq!(path, "/v1/predictions");
        assert_eq!(body["version"], "7762fd07");
        assert_eq!(body["input"]["prompt"], "fox");
    }

    #[test]
    fn test_model_prediction_request() {
        let (path, body) =
            prediction_request("meta/meta-llama-3-8b-instruct", json!({}), true);
        assert_eq!(path, "/v1/models/meta/meta-llama-3-8b-instruct/predictions");
        assert!(body.get("version").is_none());
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn test_output_helpers() {
        let urls = json!(["https://a/1.png", "https://a/2.png"]);
        assert_eq!(output_urls(&urls).len(), 2);
        assert_eq!(output_urls(&json!("https://a/x.wav")), vec!["https://a/x.wav"]);
        assert!(output_urls(&Value::Null).is_empty());

        assert_eq!(output_text(&json!(["Hel", "lo", " there"])), "Hello there");
        assert_eq!(output_text(&json!("done")), "done");
    }

    #[test]
    fn test_finish() {
        let ok: Prediction = serde_json::from_value(json!({
            "id": "p1", "status": "succeeded", "output": ["u"]
        }))
        .unwrap();
        assert_eq!(finish(ok).unwrap(), json!(["u"]));

        let failed: Prediction = serde_json::from_value(json!({
            "id": "p2", "status": "failed", "error": "CUDA out of memory"
        }))
        .unwrap();
        let err = finish(failed).unwrap_err();
        assert!(err.to_string().contains("CUDA out of memory"));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_finish_rate_limited() {
        let throttled: Prediction = serde_json::from_value(json!({
            "id": "p3", "status": "failed", "error": "{\"detail\":\"throttled\",\"retry_after\":7}"
        }))
        .unwrap();
        let err = finish(throttled).unwrap_err();

        assert_eq!(err.error_code(), "RATE_LIMITED");
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
    }

    #[test]
    fn test_instruct_prompt() {
        let prompt = ChatPrompt {
            system: Some("You are concise.".to_string()),
            turns: vec![ChatTurn {
                role: Role::User,
                content: "Outline Rust async".to_string(),
            }],
            temperature: 0.7,
            max_tokens: None,
            json_output: false,
        };

        assert_eq!(
            instruct_prompt(&prompt),
            "You are concise.\n\nUser: Outline Rust async\nAssistant:"
        );
    }

    #[test]
    fn test_sdxl_input() {
        let input = sdxl_input("fox", ImageSize { width: 720, height: 1280 });
        assert_eq!(input["width"], 720);
        assert_eq!(input["height"], 1280);
        assert_eq!(input["num_outputs"], 1);
    }
}
