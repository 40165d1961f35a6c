//! OpenAI-compatible chat, image and speech clients.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use studio_core::http::{check_response, client, read_json, transport_error};
use studio_core::{ChatModel, ChatPrompt, DeltaFn, Result, StudioError};

use crate::sse::SseDecoder;
use crate::traits::{GeneratedImage, ImageGenerator, ImageSize, SpeechSynthesizer};

const PROVIDER: &str = "openai";

/// Connection settings shared by the OpenAI clients.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub api_key: String,
}

impl OpenAiConfig {
    pub fn new(base_url: &str, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

async fn post_json(
    http: &Client,
    config: &OpenAiConfig,
    path: &str,
    body: &Value,
) -> Result<reqwest::Response> {
    let resp = http
        .post(config.url(path))
        .header("Authorization", format!("Bearer {}", config.api_key))
        .json(body)
        .send()
        .await
        .map_err(|e| transport_error(PROVIDER, e))?;
    check_response(PROVIDER, resp).await
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    content: Option<String>,
}

/// Chat model behind `/chat/completions`.
pub struct OpenAiChat {
    http: Client,
    config: OpenAiConfig,
    model: String,
}

impl OpenAiChat {
    pub fn new(config: OpenAiConfig, model: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http: client(Duration::from_secs(120))?,
            config,
            model: model.into(),
        })
    }
}

/// Reasoning models reject a sampling temperature.
fn supports_temperature(model: &str) -> bool {
    !(model.starts_with("gpt-5") || model.starts_with("o1") || model.starts_with("o3") || model.starts_with("o4"))
}

fn chat_body(model: &str, prompt: &ChatPrompt, stream: bool) -> Value {
    let mut messages = Vec::with_capacity(prompt.turns.len() + 1);
    if let Some(system) = &prompt.system {
        messages.push(json!({ "role": "system", "content": system }));
    }
    for turn in &prompt.turns {
        messages.push(json!({ "role": turn.role.as_str(), "content": turn.content }));
    }

    let mut body = json!({
        "model": model,
        "messages": messages,
        "stream": stream,
    });
    if supports_temperature(model) {
        body["temperature"] = json!(prompt.temperature);
    }
    if let Some(max_tokens) = prompt.max_tokens {
        body["max_completion_tokens"] = json!(max_tokens);
    }
    if prompt.json_output {
        body["response_format"] = json!({ "type": "json_object" });
    }
    body
}

/// Content delta carried by one stream event, if any.
fn stream_delta(data: &str) -> Option<String> {
    let chunk: StreamChunk = serde_json::from_str(data).ok()?;
    chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .filter(|s| !s.is_empty())
}

#[async_trait]
impl ChatModel for OpenAiChat {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &ChatPrompt) -> Result<String> {
        let body = chat_body(&self.model, prompt, false);
        let resp = post_json(&self.http, &self.config, "/chat/completions", &body).await?;
        let parsed: CompletionResponse = read_json(PROVIDER, resp).await?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| StudioError::Upstream {
                provider: PROVIDER.to_string(),
                status: None,
                message: "completion returned no content".to_string(),
            })
    }

    async fn stream(
        &self,
        prompt: &ChatPrompt,
        on_delta: &DeltaFn,
    ) -> Result<String> {
        let body = chat_body(&self.model, prompt, true);
        let resp = post_json(&self.http, &self.config, "/chat/completions", &body).await?;

        let mut full = String::new();
        let mut decoder = SseDecoder::new();
        let mut stream = resp.bytes_stream();

        'outer: while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| transport_error(PROVIDER, e))?;
            for event in decoder.push(&String::from_utf8_lossy(&chunk)) {
                if event.data == "[DONE]" {
                    break 'outer;
                }
                if let Some(delta) = stream_delta(&event.data) {
                    on_delta(&delta);
                    full.push_str(&delta);
                }
            }
        }

        debug!("Streamed {} chars from {}", full.len(), self.model);
        Ok(full)
    }
}

// ---------------------------------------------------------------------------
// Images
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct ImageResponse {
    data: Vec<ImageData>,
}

#[derive(Deserialize)]
struct ImageData {
    b64_json: Option<String>,
    revised_prompt: Option<String>,
}

/// Image model behind `/images/generations`.
pub struct OpenAiImages {
    http: Client,
    config: OpenAiConfig,
    model: String,
}

impl OpenAiImages {
    pub fn new(config: OpenAiConfig, model: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http: client(Duration::from_secs(180))?,
            config,
            model: model.into(),
        })
    }
}

fn image_body(model: &str, prompt: &str, size: ImageSize) -> Value {
    json!({
        "model": model,
        "prompt": prompt,
        "n": 1,
        "size": size.to_string(),
        "response_format": "b64_json",
    })
}

fn decode_image(response: ImageResponse) -> Result<GeneratedImage> {
    let first = response
        .data
        .into_iter()
        .next()
        .ok_or_else(|| StudioError::transport(PROVIDER, "image response was empty"))?;
    let encoded = first
        .b64_json
        .ok_or_else(|| StudioError::transport(PROVIDER, "image response had no data"))?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded.as_bytes())
        .map_err(|e| StudioError::internal(format!("Invalid image payload: {}", e)))?;

    Ok(GeneratedImage {
        bytes,
        revised_prompt: first.revised_prompt,
    })
}

#[async_trait]
impl ImageGenerator for OpenAiImages {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, size: ImageSize) -> Result<GeneratedImage> {
        info!("Generating {} image with {}", size, self.model);
        let body = image_body(&self.model, prompt, size);
        let resp = post_json(&self.http, &self.config, "/images/generations", &body).await?;
        let parsed: ImageResponse = read_json(PROVIDER, resp).await?;
        decode_image(parsed)
    }
}

// ---------------------------------------------------------------------------
// Speech
// ---------------------------------------------------------------------------

/// Text-to-speech behind `/audio/speech`, producing MP3.
pub struct OpenAiSpeech {
    http: Client,
    config: OpenAiConfig,
    model: String,
    voice: String,
}

impl OpenAiSpeech {
    pub fn new(config: OpenAiConfig, model: impl Into<String>, voice: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http: client(Duration::from_secs(120))?,
            config,
            model: model.into(),
            voice: voice.into(),
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiSpeech {
    fn model(&self) -> &str {
        &self.model
    }

    fn audio_extension(&self) -> &str {
        "mp3"
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let body = json!({
            "model": self.model,
            "voice": self.voice,
            "input": text,
            "response_format": "mp3",
        });
        let resp = post_json(&self.http, &self.config, "/audio/speech", &body).await?;
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;
        Ok(bytes.to_vec())
    }
}
