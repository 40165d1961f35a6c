//! Service facade over the document-chat pipeline.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

use studio_chunk::RecursiveChunker;
use studio_core::{
    content_hash, extension_of, now_millis, strip_extension, ChatModel, ChunkConfig, Document,
    DocumentStatus, DocumentStore, DocumentUpdate, Embedder, FileType, Message, Result, Reranker,
    Stats, StudioConfig, StudioError, VectorStore,
};
use studio_embed::HashingEmbedder;
use studio_providers::{extract_video_id, video_title, EventSink, TranscriptSource};
use studio_query::ContextAssembler;
use studio_store::InMemoryVectorStore;

use crate::extract::extract_text;
use crate::ingest::{IndexOutcome, Indexer};

/// Components a service is assembled from.
pub struct ServiceParts {
    pub documents: Arc<dyn DocumentStore>,
    pub embedder: Arc<dyn Embedder>,
    pub vectors: Arc<dyn VectorStore>,
    pub reranker: Option<Arc<dyn Reranker>>,
    pub chat_model: Option<Arc<dyn ChatModel>>,
    pub transcripts: Option<Arc<dyn TranscriptSource>>,
    pub events: Option<Arc<dyn EventSink>>,
}

impl ServiceParts {
    /// Hashing embedder and in-memory vectors, no remote providers.
    pub fn offline(documents: Arc<dyn DocumentStore>, dimension: usize) -> Self {
        Self {
            documents,
            embedder: Arc::new(HashingEmbedder::new(dimension)),
            vectors: Arc::new(InMemoryVectorStore::new()),
            reranker: None,
            chat_model: None,
            transcripts: None,
            events: None,
        }
    }
}

/// A file to ingest.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UploadFile {
    pub filename: String,
    #[serde(default)]
    pub bytes: Vec<u8>,
}

/// Counts reported after an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadStats {
    pub original_size: u64,
    pub chunk_count: u32,
    pub vector_count: u32,
    pub content_length: u64,
}

/// Response to a successful file upload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub document_id: String,
    pub filename: String,
    pub message: String,
    pub stats: UploadStats,
}

/// A video to ingest through its transcript.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoUpload {
    pub url: String,

    /// Used when no transcript can be fetched.
    #[serde(default)]
    pub manual_transcript: Option<String>,
}

/// Response to a successful video upload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoResponse {
    pub success: bool,
    pub document_id: String,
    pub title: String,
    pub message: String,
}

/// Event forwarded to the workflow platform.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WorkflowEvent {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// Acknowledgement of a sent event.
#[derive(Debug, Clone, Serialize)]
pub struct TriggerResponse {
    pub success: bool,
    pub message: String,
    pub ids: Vec<String>,
}

/// Generic acknowledgement.
#[derive(Debug, Clone, Serialize)]
pub struct Ack {
    pub success: bool,
    pub message: String,
}

/// Document chat service: uploads, documents, conversations and events.
pub struct StudioService {
    pub(crate) documents: Arc<dyn DocumentStore>,
    pub(crate) vectors: Arc<dyn VectorStore>,
    pub(crate) indexer: Indexer,
    pub(crate) assembler: ContextAssembler,
    pub(crate) chat_model: Option<Arc<dyn ChatModel>>,
    pub(crate) transcripts: Option<Arc<dyn TranscriptSource>>,
    pub(crate) events: Option<Arc<dyn EventSink>>,
    pub(crate) temperature: f32,
    pub(crate) max_file_size: u64,
}

impl StudioService {
    /// Assemble a service from its parts.
    pub fn new(parts: ServiceParts, config: &StudioConfig) -> Self {
        let chunk_config = ChunkConfig {
            chunk_size: config.chunking.chunk_size,
            chunk_overlap: config.chunking.chunk_overlap,
        };
        let indexer = Indexer::new(
            Arc::new(RecursiveChunker::new()),
            parts.embedder.clone(),
            parts.vectors.clone(),
            chunk_config,
        );
        let assembler = ContextAssembler::from_config(
            parts.embedder,
            parts.vectors.clone(),
            parts.reranker,
            &config.rerank,
        );

        Self {
            documents: parts.documents,
            vectors: parts.vectors,
            indexer,
            assembler,
            chat_model: parts.chat_model,
            transcripts: parts.transcripts,
            events: parts.events,
            temperature: config.chat.temperature,
            max_file_size: config.upload.max_file_size,
        }
    }

    /// Ingest an uploaded file.
    pub async fn upload_file(&self, file: UploadFile) -> Result<UploadResponse> {
        let filename = file.filename.trim().to_string();
        if filename.is_empty() {
            return Err(StudioError::invalid_argument("No file provided"));
        }

        let file_type = FileType::from_filename(&filename).ok_or_else(|| {
            StudioError::UnsupportedFileType {
                extension: extension_of(&filename).unwrap_or("").to_lowercase(),
            }
        })?;

        let size = file.bytes.len() as u64;
        if size > self.max_file_size {
            return Err(StudioError::FileTooLarge {
                size,
                max_size: self.max_file_size,
            });
        }

        let doc = Document::new(strip_extension(&filename), &filename, file_type, size);
        self.documents.insert_document(doc.clone()).await?;
        info!("Processing upload {} as {}", filename, doc.id);

        let result = async {
            let content = extract_text(file_type, &filename, file.bytes).await?;
            let outcome = self
                .indexer
                .index(
                    &doc,
                    &filename,
                    &content,
                    "No content could be extracted from the file.",
                )
                .await?;
            Ok::<_, StudioError>((content, outcome))
        }
        .await;

        let (content, outcome) = match result {
            Ok(done) => done,
            Err(e) => {
                self.mark_failed(&doc.id, &e).await;
                return Err(e);
            }
        };

        self.mark_completed(&doc.id, &content, &outcome).await?;

        Ok(UploadResponse {
            success: true,
            document_id: doc.id,
            filename,
            message: format!(
                "Successfully processed {} chunks and stored {} vectors.",
                outcome.chunk_count, outcome.vector_count
            ),
            stats: UploadStats {
                original_size: size,
                chunk_count: outcome.chunk_count,
                vector_count: outcome.vector_count,
                content_length: outcome.content_length,
            },
        })
    }

    /// Ingest a video through its transcript.
    pub async fn upload_video(&self, upload: VideoUpload) -> Result<VideoResponse> {
        let url = upload.url.trim().to_string();
        if url.is_empty() {
            return Err(StudioError::invalid_argument("YouTube URL is required"));
        }
        let video_id = extract_video_id(&url)
            .ok_or_else(|| StudioError::invalid_argument("Invalid YouTube URL"))?;

        let mut doc = Document::new("Processing YouTube Video...", &url, FileType::Youtube, 0);
        doc.video_url = Some(url.clone());
        self.documents.insert_document(doc.clone()).await?;
        info!("Processing video {} as {}", video_id, doc.id);

        let transcript = match self.fetch_transcript(&video_id, upload.manual_transcript).await {
            Ok(transcript) => transcript,
            Err(e) => {
                self.mark_failed(&doc.id, &e).await;
                return Err(StudioError::extraction(
                    format!("video {}", video_id),
                    "Failed to fetch transcript. Ensure the video has captions.",
                ));
            }
        };

        let title = video_title(&video_id);
        let doc = self
            .documents
            .update_document(
                &doc.id,
                DocumentUpdate {
                    title: Some(title.clone()),
                    ..Default::default()
                },
            )
            .await?;

        let outcome = match self
            .indexer
            .index(
                &doc,
                &title,
                &transcript,
                "No content could be extracted from the transcript.",
            )
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                self.mark_failed(&doc.id, &e).await;
                return Err(e);
            }
        };

        self.mark_completed(&doc.id, &transcript, &outcome).await?;

        Ok(VideoResponse {
            success: true,
            document_id: doc.id,
            title,
            message: "Successfully processed video.".to_string(),
        })
    }

    /// Fetched transcript, or the manual one when fetching fails.
    async fn fetch_transcript(&self, video_id: &str, manual: Option<String>) -> Result<String> {
        let manual = manual.filter(|t| !t.trim().is_empty());

        let fetched = match &self.transcripts {
            Some(source) => source.fetch_transcript(video_id).await,
            None => Err(StudioError::config("No transcript source configured")),
        };

        match (fetched, manual) {
            (Ok(transcript), _) => Ok(transcript),
            (Err(e), Some(manual)) => {
                warn!("Transcript fetch for {} failed, using manual transcript: {}", video_id, e);
                Ok(manual)
            }
            (Err(e), None) => Err(e),
        }
    }

    async fn mark_completed(&self, id: &str, content: &str, outcome: &IndexOutcome) -> Result<()> {
        self.documents
            .update_document(
                id,
                DocumentUpdate {
                    status: Some(DocumentStatus::Completed),
                    chunk_count: Some(outcome.chunk_count),
                    vector_count: Some(outcome.vector_count),
                    content_length: Some(outcome.content_length),
                    content_hash: Some(content_hash(content)),
                    processed_at: Some(now_millis()),
                    ..Default::default()
                },
            )
            .await?;
        Ok(())
    }

    async fn mark_failed(&self, id: &str, cause: &StudioError) {
        error!("Processing {} failed: {}", id, cause);
        if let Err(e) = self
            .documents
            .update_document(id, DocumentUpdate::failed(cause.to_string()))
            .await
        {
            error!("Failed to record error for {}: {}", id, e);
        }
    }

    /// All documents, newest first.
    pub async fn list_documents(&self) -> Result<Vec<Document>> {
        self.documents.list_documents().await
    }

    /// Delete a document with its vectors and conversation.
    pub async fn delete_document(&self, id: &str) -> Result<Ack> {
        let id = id.trim();
        if id.is_empty() {
            return Err(StudioError::invalid_argument("Document ID is required"));
        }

        if self.documents.get_document(id).await?.is_none() {
            return Err(StudioError::DocumentNotFound { id: id.to_string() });
        }

        self.vectors.delete_document(id).await?;
        let messages = self.documents.delete_conversation(id).await?;
        self.documents.delete_document(id).await?;

        info!("Deleted document {} and {} messages", id, messages);
        Ok(Ack {
            success: true,
            message: "Document deleted successfully".to_string(),
        })
    }

    /// Stored messages of a conversation, in order.
    pub async fn get_messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let conversation_id = conversation_id.trim();
        if conversation_id.is_empty() {
            return Err(StudioError::invalid_argument("Conversation ID is required"));
        }
        self.documents.load_messages(conversation_id).await
    }

    /// Forward an event to the workflow platform.
    pub async fn trigger_workflow(&self, event: WorkflowEvent) -> Result<TriggerResponse> {
        let name = event.name.trim();
        if name.is_empty() {
            return Err(StudioError::invalid_argument("Event name is required"));
        }

        let sink = self
            .events
            .as_ref()
            .ok_or_else(|| StudioError::config("INNGEST_EVENT_KEY is not set"))?;

        let data = event
            .data
            .unwrap_or_else(|| Value::Object(Default::default()));
        let ids = sink.send(name, data).await?;

        Ok(TriggerResponse {
            success: true,
            message: format!("Event {} sent", name),
            ids,
        })
    }

    /// Store counts, with the vector count when the index reports it.
    pub async fn stats(&self) -> Result<Stats> {
        let mut stats = self.documents.get_stats().await?;
        stats.vectors = match self.vectors.stats().await {
            Ok(index) => Some(index.vector_count),
            Err(e) => {
                warn!("Vector index stats unavailable: {}", e);
                None
            }
        };
        Ok(stats)
    }
}
