//! Cross-encoder reranking with graceful fallback.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use studio_core::config::RerankConfig;
use studio_core::http::{check_response, client, read_json, transport_error};
use studio_core::{ContextSource, RerankScore, Reranker, Result, StudioError};

const PROVIDER: &str = "cohere";
const DEFAULT_BASE_URL: &str = "https://api.cohere.com";

#[derive(Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: &'a [&'a str],
    max_tokens_per_doc: u32,
}

#[derive(Deserialize)]
struct RerankResponse {
    #[serde(default)]
    results: Vec<RerankResult>,
}

#[derive(Deserialize)]
struct RerankResult {
    index: usize,
    relevance_score: f32,
}

/// Reranker backed by Cohere's `/v2/rerank` endpoint.
pub struct CohereReranker {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens_per_doc: u32,
}

impl CohereReranker {
    pub fn new(api_key: impl Into<String>, config: &RerankConfig) -> Result<Self> {
        Ok(Self {
            client: client(Duration::from_secs(30))?,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: config.model.clone(),
            max_tokens_per_doc: config.max_tokens_per_doc,
        })
    }

    /// Point the client at another host (proxies, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

/// Validate returned indices against the number of candidates sent.
fn into_scores(response: RerankResponse, candidates: usize) -> Result<Vec<RerankScore>> {
    response
        .results
        .into_iter()
        .map(|r| {
            if r.index >= candidates {
                return Err(StudioError::rerank(format!(
                    "Result index {} out of range for {} documents",
                    r.index, candidates
                )));
            }
            Ok(RerankScore {
                index: r.index,
                relevance: r.relevance_score,
            })
        })
        .collect()
}

#[async_trait]
impl Reranker for CohereReranker {
    async fn rerank(&self, query: &str, documents: &[&str]) -> Result<Vec<RerankScore>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let body = RerankRequest {
            model: &self.model,
            query,
            documents,
            max_tokens_per_doc: self.max_tokens_per_doc,
        };

        let resp = self
            .client
            .post(format!("{}/v2/rerank", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        let resp = check_response(PROVIDER, resp).await?;
        let parsed: RerankResponse = read_json(PROVIDER, resp).await?;
        into_scores(parsed, documents.len())
    }
}

/// Rerank `candidates` by relevance to `query`.
///
/// Returns the candidates in their original order when no reranker is
/// configured, when the reranker fails, or when it returns nothing. On
/// success each candidate's `similarity` is replaced by its relevance.
pub async fn rerank_or_fallback(
    reranker: Option<&dyn Reranker>,
    query: &str,
    candidates: Vec<ContextSource>,
) -> Vec<ContextSource> {
    let reranker = match reranker {
        Some(r) if !candidates.is_empty() => r,
        _ => return candidates,
    };

    let documents: Vec<&str> = candidates.iter().map(|c| c.content.as_str()).collect();
    let scores = match reranker.rerank(query, &documents).await {
        Ok(scores) if !scores.is_empty() => scores,
        Ok(_) => {
            warn!("Reranker returned no results, keeping similarity order");
            return candidates;
        }
        Err(e) => {
            warn!("Reranking failed, keeping similarity order: {}", e);
            return candidates;
        }
    };

    if scores.iter().any(|s| s.index >= candidates.len()) {
        warn!("Reranker returned an out-of-range index, keeping similarity order");
        return candidates;
    }

    debug!("Reranked {} candidates", scores.len());

    scores
        .into_iter()
        .map(|score| ContextSource {
            similarity: score.relevance,
            ..candidates[score.index].clone()
        })
        .collect()
}
