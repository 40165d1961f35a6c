//! Pinecone vector index client (REST data and control plane).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use studio_core::config::VectorStoreConfig;
use studio_core::http::{check_response, client, read_json, transport_error};
use studio_core::{
    IndexStats, Result, RetryPolicy, StudioError, VectorFilter, VectorMatch, VectorMetadata,
    VectorRecord, VectorStore,
};

const PROVIDER: &str = "pinecone";
const CONTROL_PLANE: &str = "https://api.pinecone.io";
const API_VERSION: &str = "2024-07";

/// Client for one Pinecone index, addressed by its host.
pub struct PineconeStore {
    client: Client,
    host: String,
    api_key: String,
    upsert_batch_size: usize,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<RawMatch>,
}

#[derive(Debug, Deserialize)]
struct RawMatch {
    id: String,
    score: Option<f32>,
    metadata: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
    #[serde(default)]
    total_vector_count: u64,
    dimension: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct IndexDescription {
    name: String,
    #[serde(default)]
    host: String,
}

#[derive(Debug, Deserialize)]
struct IndexList {
    #[serde(default)]
    indexes: Vec<IndexDescription>,
}

impl PineconeStore {
    /// Create a client for the index at `host`.
    pub fn new(
        api_key: impl Into<String>,
        host: &str,
        config: &VectorStoreConfig,
    ) -> Result<Self> {
        Ok(Self {
            client: client(Duration::from_secs(30))?,
            host: normalize_host(host),
            api_key: api_key.into(),
            upsert_batch_size: config.upsert_batch_size.max(1),
            retry: RetryPolicy::fixed(3, Duration::from_secs(2)).transient_only(),
        })
    }

    /// Resolve the host of `config.index_name` through the control plane.
    pub async fn connect(api_key: &str, config: &VectorStoreConfig) -> Result<Self> {
        let client = client(Duration::from_secs(30))?;
        let resp = client
            .get(format!("{}/indexes/{}", CONTROL_PLANE, config.index_name))
            .header("Api-Key", api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;
        let resp = check_response(PROVIDER, resp).await?;
        let index: IndexDescription = read_json(PROVIDER, resp).await?;

        info!("Resolved index {} at {}", index.name, index.host);
        Self::new(api_key, &index.host, config)
    }

    /// Create a serverless cosine index unless one with this name exists.
    ///
    /// Returns true when the index was created.
    pub async fn ensure_index(api_key: &str, index_name: &str, dimension: usize) -> Result<bool> {
        let client = client(Duration::from_secs(30))?;

        let resp = client
            .get(format!("{}/indexes", CONTROL_PLANE))
            .header("Api-Key", api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;
        let resp = check_response(PROVIDER, resp).await?;
        let list: IndexList = read_json(PROVIDER, resp).await?;

        if list.indexes.iter().any(|i| i.name == index_name) {
            debug!("Index {} already exists", index_name);
            return Ok(false);
        }

        info!("Creating index {} (dim={})", index_name, dimension);
        let resp = client
            .post(format!("{}/indexes", CONTROL_PLANE))
            .header("Api-Key", api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .json(&create_index_body(index_name, dimension))
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;
        check_response(PROVIDER, resp).await?;

        Ok(true)
    }

    async fn post(&self, path: &str, body: &Value) -> Result<reqwest::Response> {
        let resp = self
            .client
            .post(format!("{}{}", self.host, path))
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;
        check_response(PROVIDER, resp).await
    }
}

fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}

fn create_index_body(index_name: &str, dimension: usize) -> Value {
    json!({
        "name": index_name,
        "dimension": dimension,
        "metric": "cosine",
        "spec": {
            "serverless": {
                "cloud": "aws",
                "region": "us-east-1"
            }
        }
    })
}

fn metadata_filter(filter: &VectorFilter) -> Option<Value> {
    filter
        .document_id
        .as_ref()
        .map(|id| json!({ "documentId": { "$eq": id } }))
}

fn upsert_body(records: &[VectorRecord]) -> Value {
    json!({ "vectors": records })
}

fn query_body(vector: &[f32], top_k: usize, filter: &VectorFilter) -> Value {
    let mut body = json!({
        "vector": vector,
        "topK": top_k,
        "includeMetadata": true,
    });
    if let Some(filter) = metadata_filter(filter) {
        body["filter"] = filter;
    }
    body
}

fn delete_body(document_id: &str) -> Value {
    json!({ "filter": { "documentId": { "$eq": document_id } } })
}

/// Keep matches carrying both a score and readable metadata.
fn parse_matches(response: QueryResponse) -> Vec<VectorMatch> {
    response
        .matches
        .into_iter()
        .filter_map(|m| {
            let score = m.score?;
            let metadata: VectorMetadata = match serde_json::from_value(m.metadata?) {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!("Skipping match {} with unreadable metadata: {}", m.id, e);
                    return None;
                }
            };
            Some(VectorMatch {
                id: m.id,
                score,
                metadata,
            })
        })
        .collect()
}

#[async_trait]
impl VectorStore for PineconeStore {
    async fn upsert(&self, records: &[VectorRecord]) -> Result<usize> {
        let mut written = 0;
        for batch in records.chunks(self.upsert_batch_size) {
            let body = upsert_body(batch);
            self.retry
                .run("pinecone upsert", || self.post("/vectors/upsert", &body))
                .await?;
            written += batch.len();
        }

        info!("Stored {} vectors", written);
        Ok(written)
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &VectorFilter,
    ) -> Result<Vec<VectorMatch>> {
        let body = query_body(vector, top_k, filter);
        let resp = self
            .retry
            .run("pinecone query", || self.post("/query", &body))
            .await?;
        let parsed: QueryResponse = read_json(PROVIDER, resp).await?;

        let matches = parse_matches(parsed);
        debug!("Vector search returned {} matches", matches.len());
        Ok(matches)
    }

    async fn delete_document(&self, document_id: &str) -> Result<()> {
        let body = delete_body(document_id);
        self.retry
            .run("pinecone delete", || self.post("/vectors/delete", &body))
            .await
            .map_err(|e| {
                StudioError::vector_store(format!(
                    "Failed to delete vectors for {}: {}",
                    document_id, e
                ))
            })?;

        info!("Deleted vectors for document {}", document_id);
        Ok(())
    }

    async fn stats(&self) -> Result<IndexStats> {
        let resp = self.post("/describe_index_stats", &json!({})).await?;
        let parsed: StatsResponse = read_json(PROVIDER, resp).await?;

        Ok(IndexStats {
            vector_count: parsed.total_vector_count,
            dimension: parsed.dimension,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(document_id: &str, index: u32) -> VectorMetadata {
        VectorMetadata {
            document_id: document_id.to_string(),
            chunk_index: index,
            content: "Document: essay\n\nIntroduction".to_string(),
            title: "essay".to_string(),
            filename: "essay.pdf".to_string(),
            file_type: "pdf".to_string(),
        }
    }

    #[test]
    fn test_data_plane_retries_only_transient_failures() {
        let store =
            PineconeStore::new("key", "rag-abc.svc.pinecone.io", &VectorStoreConfig::default())
                .unwrap();
        assert_eq!(store.retry.max_attempts, 3);
        assert_eq!(store.retry.retry_on, studio_core::RetryOn::Transient);
    }

    #[test]
    fn test_normalize_host() {
        assert_eq!(
            normalize_host("rag-abc.svc.pinecone.io/"),
            "https://rag-abc.svc.pinecone.io"
        );
        assert_eq!(normalize_host("http://localhost:5080"), "http://localhost:5080");
    }

    #[test]
    fn test_upsert_body_uses_camel_case_metadata() {
        let record = VectorRecord {
            id: VectorRecord::id_for("doc-1", 0),
            values: vec![0.5, 0.25],
            metadata: metadata("doc-1", 0),
        };
        let body = upsert_body(&[record]);

        let vector = &body["vectors"][0];
        assert_eq!(vector["id"], "doc-1-chunk-0");
        assert_eq!(vector["values"][1], 0.25);
        assert_eq!(vector["metadata"]["documentId"], "doc-1");
        assert_eq!(vector["metadata"]["chunkIndex"], 0);
        assert_eq!(vector["metadata"]["fileType"], "pdf");
    }

    #[test]
    fn test_query_body() {
        let body = query_body(&[1.0, 0.0], 20, &VectorFilter::document("doc-9"));
        assert_eq!(body["topK"], 20);
        assert_eq!(body["includeMetadata"], true);
        assert_eq!(body["filter"]["documentId"]["$eq"], "doc-9");

        let unfiltered = query_body(&[1.0], 5, &VectorFilter::default());
        assert!(unfiltered.get("filter").is_none());
    }

    #[test]
    fn test_delete_body() {
        assert_eq!(
            delete_body("doc-3"),
            json!({ "filter": { "documentId": { "$eq": "doc-3" } } })
        );
    }

    #[test]
    fn test_parse_matches_skips_incomplete() {
        let good = serde_json::to_value(metadata("doc-1", 2)).unwrap();
        let response: QueryResponse = serde_json::from_value(json!({
            "matches": [
                { "id": "doc-1-chunk-2", "score": 0.91, "metadata": good },
                { "id": "doc-1-chunk-3", "score": 0.80 },
                { "id": "doc-1-chunk-4", "metadata": { "documentId": "doc-1" } },
                { "id": "doc-1-chunk-5", "score": 0.70, "metadata": { "unexpected": true } }
            ]
        }))
        .unwrap();

        let matches = parse_matches(response);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, "doc-1-chunk-2");
        assert_eq!(matches[0].metadata.chunk_index, 2);
    }

    #[test]
    fn test_parse_stats() {
        let stats: StatsResponse =
            serde_json::from_value(json!({ "dimension": 1536, "totalVectorCount": 42, "namespaces": {} }))
                .unwrap();
        assert_eq!(stats.total_vector_count, 42);
        assert_eq!(stats.dimension, Some(1536));
    }

    #[test]
    fn test_create_index_body() {
        let body = create_index_body("rag-documents", 1536);
        assert_eq!(body["metric"], "cosine");
        assert_eq!(body["spec"]["serverless"]["region"], "us-east-1");
    }
}
