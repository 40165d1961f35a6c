//! studio-service - Document chat operations
//!
//! [`StudioService`] ties the pipeline together: uploads are extracted,
//! chunked, embedded and indexed; chat requests are answered from the
//! document's retrieved context and stored as conversations; workflow
//! events are forwarded to the durable-execution platform.
//!
//! Every operation takes and returns serde types, so the same calls back
//! the CLI and any other front end.

mod chat;
mod extract;
mod ingest;
mod service;
mod setup;

pub use chat::{system_prompt, ChatEvent, ChatRequest, ChatStream};
pub use extract::{docx_xml_text, extract_text};
pub use ingest::{IndexOutcome, Indexer};
pub use service::{
    Ack, ServiceParts, StudioService, TriggerResponse, UploadFile, UploadResponse, UploadStats,
    VideoResponse, VideoUpload, WorkflowEvent,
};
pub use setup::{ensure_vector_index, OFFLINE_DIMENSION};
