//! Core domain types for the studio pipeline.

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Current time as Unix millis.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Source type of an uploaded document, determines the text extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Pdf,
    Docx,
    Txt,
    Md,
    Youtube,
}

impl FileType {
    /// Detect file type from an extension. Only uploadable types are known.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "txt" => Some(Self::Txt),
            "md" | "markdown" => Some(Self::Md),
            _ => None,
        }
    }

    /// Detect file type from a file name.
    pub fn from_filename(filename: &str) -> Option<Self> {
        extension_of(filename).and_then(Self::from_extension)
    }

    /// Extension-style name stored with the document.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Txt => "txt",
            Self::Md => "md",
            Self::Youtube => "youtube",
        }
    }

    /// Parse the stored name back.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "youtube" => Some(Self::Youtube),
            other => Self::from_extension(other),
        }
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lowercase extension of a file name, if it has one.
pub fn extension_of(filename: &str) -> Option<&str> {
    let (stem, ext) = filename.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext)
}

/// File name with its last extension removed ("essay.final.pdf" -> "essay.final").
pub fn strip_extension(filename: &str) -> &str {
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => stem,
        _ => filename,
    }
}

/// Processing state of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Uploading,
    Processing,
    Completed,
    Error,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploading => "uploading",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "uploading" => Some(Self::Uploading),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A document known to the chat system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Identifier, `doc-<ulid>`.
    pub id: String,

    /// Display title (file name without extension, or video title).
    pub title: String,

    /// Original file name (or the video URL for transcripts).
    pub filename: String,

    /// Source type.
    pub file_type: FileType,

    /// Uploaded size in bytes.
    pub file_size: u64,

    /// Processing state.
    pub status: DocumentStatus,

    /// Failure description when `status` is `Error`.
    pub error_message: Option<String>,

    /// Number of chunks produced.
    pub chunk_count: Option<u32>,

    /// Number of vectors stored.
    pub vector_count: Option<u32>,

    /// Length of the extracted text in characters.
    pub content_length: Option<u64>,

    /// Blake3 hash (hex) of the extracted text.
    pub content_hash: Option<String>,

    /// Source URL for video transcripts.
    pub video_url: Option<String>,

    /// Upload timestamp (Unix millis).
    pub uploaded_at: u64,

    /// Completion timestamp (Unix millis).
    pub processed_at: Option<u64>,
}

impl Document {
    /// Create a new document in the `Processing` state.
    pub fn new(title: &str, filename: &str, file_type: FileType, file_size: u64) -> Self {
        Self {
            id: new_document_id(),
            title: title.to_string(),
            filename: filename.to_string(),
            file_type,
            file_size,
            status: DocumentStatus::Processing,
            error_message: None,
            chunk_count: None,
            vector_count: None,
            content_length: None,
            content_hash: None,
            video_url: None,
            uploaded_at: now_millis(),
            processed_at: None,
        }
    }

    /// Apply a partial update in place.
    pub fn apply(&mut self, update: &DocumentUpdate) {
        if let Some(title) = &update.title {
            self.title = title.clone();
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(msg) = &update.error_message {
            self.error_message = Some(msg.clone());
        }
        if let Some(n) = update.chunk_count {
            self.chunk_count = Some(n);
        }
        if let Some(n) = update.vector_count {
            self.vector_count = Some(n);
        }
        if let Some(n) = update.content_length {
            self.content_length = Some(n);
        }
        if let Some(hash) = &update.content_hash {
            self.content_hash = Some(hash.clone());
        }
        if let Some(ts) = update.processed_at {
            self.processed_at = Some(ts);
        }
    }
}

/// Generate a document identifier.
pub fn new_document_id() -> String {
    format!("doc-{}", Ulid::new().to_string().to_lowercase())
}

/// Blake3 content hash, hex encoded.
pub fn content_hash(content: &str) -> String {
    hex::encode(blake3::hash(content.as_bytes()).as_bytes())
}

/// Partial document update; `None` fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentUpdate {
    pub title: Option<String>,
    pub status: Option<DocumentStatus>,
    pub error_message: Option<String>,
    pub chunk_count: Option<u32>,
    pub vector_count: Option<u32>,
    pub content_length: Option<u64>,
    pub content_hash: Option<String>,
    pub processed_at: Option<u64>,
}

impl DocumentUpdate {
    /// Mark a document failed.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: Some(DocumentStatus::Error),
            error_message: Some(message.into()),
            ..Default::default()
        }
    }
}

/// A chunk of a document, ready for embedding. Not persisted on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Index within the document (0-based).
    pub index: u32,

    /// Chunk text without the prefix.
    pub text: String,

    /// Header naming the source document.
    pub context_prefix: String,
}

impl Chunk {
    /// Text that gets embedded and stored: prefix followed by the chunk.
    pub fn content(&self) -> String {
        format!("{}{}", self.context_prefix, self.text)
    }
}

/// Metadata stored with every vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorMetadata {
    pub document_id: String,
    pub chunk_index: u32,
    pub content: String,
    pub title: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub file_type: String,
}

/// A vector to upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    /// `<documentId>-chunk-<index>`.
    pub id: String,

    pub values: Vec<f32>,

    pub metadata: VectorMetadata,
}

impl VectorRecord {
    /// Build the record for chunk `index` of a document.
    pub fn id_for(document_id: &str, index: u32) -> String {
        format!("{}-chunk-{}", document_id, index)
    }
}

/// A similarity search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMatch {
    pub id: String,
    pub score: f32,
    pub metadata: VectorMetadata,
}

/// Restricts a similarity search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VectorFilter {
    pub document_id: Option<String>,
}

impl VectorFilter {
    pub fn document(document_id: &str) -> Self {
        Self {
            document_id: Some(document_id.to_string()),
        }
    }

    /// Whether a record's metadata passes the filter.
    pub fn matches(&self, metadata: &VectorMetadata) -> bool {
        match &self.document_id {
            Some(id) => metadata.document_id == *id,
            None => true,
        }
    }
}

/// Vector index statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub vector_count: u64,
    pub dimension: Option<usize>,
}

/// Retrieved chunk cited in an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSource {
    pub document_id: String,
    pub document_title: String,
    pub chunk_id: String,
    pub content: String,
    /// Similarity, or relevance after reranking.
    pub similarity: f32,
}

/// Chat participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

/// Piece of a chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum MessagePart {
    Text { text: String },
}

/// A chat message as exchanged with clients and persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
    /// Legacy plain-text body, used when `parts` is empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl Message {
    /// Create a single-text-part message with a fresh id.
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            id: new_message_id(),
            role,
            parts: vec![MessagePart::Text { text: text.into() }],
            content: None,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::text(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::text(Role::Assistant, text)
    }

    /// First text part, falling back to the legacy `content` field.
    pub fn first_text(&self) -> Option<&str> {
        self.parts
            .iter()
            .map(|p| match p {
                MessagePart::Text { text } => text.as_str(),
            })
            .next()
            .or(self.content.as_deref())
    }

    /// All text parts concatenated.
    pub fn joined_text(&self) -> String {
        if self.parts.is_empty() {
            return self.content.clone().unwrap_or_default();
        }
        self.parts
            .iter()
            .map(|p| match p {
                MessagePart::Text { text } => text.as_str(),
            })
            .collect()
    }
}

/// Generate a message identifier.
pub fn new_message_id() -> String {
    format!("msg_{}", Ulid::new().to_string().to_lowercase())
}

/// One turn sent to a chat model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl From<&Message> for ChatTurn {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role,
            content: message.joined_text(),
        }
    }
}

/// Prompt for a chat completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatPrompt {
    pub system: Option<String>,
    pub turns: Vec<ChatTurn>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,

    /// Ask the model for a single JSON object.
    #[serde(default)]
    pub json_output: bool,
}

impl ChatPrompt {
    /// One user turn under an optional system prompt.
    pub fn single(system: Option<&str>, user: &str, temperature: f32) -> Self {
        Self {
            system: system.map(String::from),
            turns: vec![ChatTurn {
                role: Role::User,
                content: user.to_string(),
            }],
            temperature,
            max_tokens: None,
            json_output: false,
        }
    }

    pub fn with_json_output(mut self) -> Self {
        self.json_output = true;
        self
    }
}

/// Statistics about the studio stores.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stats {
    pub documents: u64,
    pub completed_documents: u64,
    pub messages: u64,
    pub vectors: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_type_from_filename() {
        assert_eq!(FileType::from_filename("report.PDF"), Some(FileType::Pdf));
        assert_eq!(FileType::from_filename("notes.md"), Some(FileType::Md));
        assert_eq!(FileType::from_filename("memo.docx"), Some(FileType::Docx));
        assert_eq!(FileType::from_filename("image.png"), None);
        assert_eq!(FileType::from_filename("no_extension"), None);
        assert_eq!(FileType::parse("youtube"), Some(FileType::Youtube));
    }

    #[test]
    fn test_strip_extension() {
        assert_eq!(strip_extension("essay.pdf"), "essay");
        assert_eq!(strip_extension("essay.final.pdf"), "essay.final");
        assert_eq!(strip_extension("README"), "README");
        assert_eq!(strip_extension(".env"), ".env");
    }

    #[test]
    fn test_document_ids() {
        let doc = Document::new("essay", "essay.pdf", FileType::Pdf, 10);
        assert!(doc.id.starts_with("doc-"));
        assert_eq!(doc.status, DocumentStatus::Processing);
        assert_ne!(doc.id, new_document_id());
    }

    #[test]
    fn test_document_apply_update() {
        let mut doc = Document::new("essay", "essay.pdf", FileType::Pdf, 10);
        doc.apply(&DocumentUpdate {
            status: Some(DocumentStatus::Completed),
            chunk_count: Some(3),
            vector_count: Some(3),
            ..Default::default()
        });
        assert_eq!(doc.status, DocumentStatus::Completed);
        assert_eq!(doc.chunk_count, Some(3));
        assert_eq!(doc.title, "essay");

        doc.apply(&DocumentUpdate::failed("boom"));
        assert_eq!(doc.status, DocumentStatus::Error);
        assert_eq!(doc.error_message.as_deref(), Some("boom"));
    }

    #[test]
    fn test_vector_record_id() {
        assert_eq!(VectorRecord::id_for("doc123", 2), "doc123-chunk-2");
    }

    #[test]
    fn test_message_text() {
        let msg = Message::user("hello");
        assert!(msg.id.starts_with("msg_"));
        assert_eq!(msg.first_text(), Some("hello"));

        let legacy: Message =
            serde_json::from_str(r#"{"id":"m1","role":"user","content":"legacy body"}"#).unwrap();
        assert_eq!(legacy.first_text(), Some("legacy body"));
        assert_eq!(legacy.joined_text(), "legacy body");
    }

    #[test]
    fn test_message_part_wire_format() {
        let msg = Message::assistant("hi");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["parts"][0]["type"], "text");
        assert_eq!(json["parts"][0]["text"], "hi");
    }

    #[test]
    fn test_vector_metadata_camel_case() {
        let meta = VectorMetadata {
            document_id: "doc1".into(),
            chunk_index: 0,
            content: "c".into(),
            title: "t".into(),
            filename: "t.txt".into(),
            file_type: "txt".into(),
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["documentId"], "doc1");
        assert_eq!(json["chunkIndex"], 0);
    }

    #[test]
    fn test_content_hash_stable() {
        assert_eq!(content_hash("abc"), content_hash("abc"));
        assert_ne!(content_hash("abc"), content_hash("abd"));
        assert_eq!(content_hash("abc").len(), 64);
    }
}
