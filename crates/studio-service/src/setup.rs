//! Building a service from configuration and environment keys.

use std::sync::Arc;

use tracing::{info, warn};

use studio_core::{ApiKeys, ChatModel, DocumentStore, Result, StudioConfig};
use studio_embed::OpenAiEmbedder;
use studio_providers::{OpenAiChat, OpenAiConfig, WorkflowClient, YouTubeTranscripts};
use studio_query::CohereReranker;
use studio_store::{PineconeStore, SqliteStore};

use crate::service::{ServiceParts, StudioService};

/// Dimension of the offline hashing embedder.
pub const OFFLINE_DIMENSION: usize = 384;

impl StudioService {
    /// Service over a database with offline retrieval and no remote providers.
    pub fn offline(documents: Arc<dyn DocumentStore>, config: &StudioConfig) -> Self {
        Self::new(ServiceParts::offline(documents, OFFLINE_DIMENSION), config)
    }

    /// Open the configured database and pick providers by the keys present.
    ///
    /// Hosted embeddings and vectors are used only when both the OpenAI and
    /// Pinecone keys are set; otherwise retrieval runs offline and vectors
    /// live only as long as the process.
    pub async fn from_config(config: &StudioConfig, keys: &ApiKeys) -> Result<Self> {
        let store = SqliteStore::open_with_timeout(
            &config.database.path,
            config.database.busy_timeout_ms,
        )?;
        let mut parts = ServiceParts::offline(Arc::new(store), OFFLINE_DIMENSION);

        match (&keys.openai, &keys.pinecone) {
            (Some(openai), Some(pinecone)) => {
                parts.embedder = Arc::new(
                    OpenAiEmbedder::new(openai.as_str(), &config.embedding)?
                        .with_retry(config.retry.policy()),
                );
                let vectors = match &keys.pinecone_host {
                    Some(host) => PineconeStore::new(pinecone.as_str(), host, &config.vector_store)?,
                    None => PineconeStore::connect(pinecone, &config.vector_store).await?,
                };
                parts.vectors = Arc::new(vectors);
                info!("Using hosted embeddings and index {}", config.vector_store.index_name);
            }
            _ => warn!("OPENAI_API_KEY or PINECONE_API_KEY missing, retrieval runs offline"),
        }

        if let Some(cohere) = &keys.cohere {
            parts.reranker = Some(Arc::new(CohereReranker::new(cohere.as_str(), &config.rerank)?));
        }

        if let Some(openai) = &keys.openai {
            parts.chat_model = Some(chat_model(openai, config)?);
        }

        if let Some(event_key) = &keys.workflow_event_key {
            parts.events = Some(Arc::new(WorkflowClient::new(
                &config.workflow.base_url,
                event_key.as_str(),
            )?));
        }

        parts.transcripts = Some(Arc::new(YouTubeTranscripts::new()?));

        Ok(Self::new(parts, config))
    }
}

fn chat_model(api_key: &str, config: &StudioConfig) -> Result<Arc<dyn ChatModel>> {
    let openai = OpenAiConfig::new(&config.chat.base_url, api_key);
    Ok(Arc::new(OpenAiChat::new(openai, config.chat.model.as_str())?))
}

/// Create the hosted index sized for the embedding model, if missing.
pub async fn ensure_vector_index(keys: &ApiKeys, config: &StudioConfig) -> Result<bool> {
    let api_key = ApiKeys::require(&keys.pinecone, "PINECONE_API_KEY")?;
    PineconeStore::ensure_index(
        api_key,
        &config.vector_store.index_name,
        config.embedding.dimension,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_from_config_without_keys_runs_offline() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = StudioConfig::default();
        config.database.path = dir.path().join("studio.db");

        let service = StudioService::from_config(&config, &ApiKeys::default())
            .await
            .unwrap();

        assert!(service.chat_model.is_none());
        assert!(service.events.is_none());
        assert!(service.transcripts.is_some());
        assert!(config.database.path.exists());
        assert_eq!(service.stats().await.unwrap().vectors, Some(0));
    }

    #[tokio::test]
    async fn test_ensure_index_requires_key() {
        let err = ensure_vector_index(&ApiKeys::default(), &StudioConfig::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("PINECONE_API_KEY"));
    }
}
