//! Streaming document chat.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use studio_core::{
    new_message_id, ChatModel, ChatPrompt, ChatTurn, ContextSource, DocumentStore, Message,
    Result, StudioError,
};

use crate::service::StudioService;

/// A chat request about one document.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// Defaults to the document id.
    #[serde(default)]
    pub conversation_id: Option<String>,

    #[serde(default, alias = "selectedDocumentId")]
    pub document_id: String,

    /// Full message history, latest last.
    #[serde(default)]
    pub messages: Option<Vec<Message>>,

    /// Only the new message; history is loaded from the store.
    #[serde(default)]
    pub message: Option<Message>,
}

/// Something produced while answering.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// Next fragment of the answer.
    Delta(String),

    /// The answer is complete and stored.
    Done {
        message: Message,
        sources: Vec<ContextSource>,
    },

    /// The model failed; nothing was stored.
    Error(String),
}

/// Answer being streamed.
///
/// The completion runs on its own task and is consumed to the end even if
/// this stream is dropped.
#[derive(Debug)]
pub struct ChatStream {
    conversation_id: String,
    sources: Vec<ContextSource>,
    events: mpsc::UnboundedReceiver<ChatEvent>,
    task: JoinHandle<Result<Message>>,
}

impl ChatStream {
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Sources the answer is grounded on, in citation order.
    pub fn sources(&self) -> &[ContextSource] {
        &self.sources
    }

    /// Next event, or `None` once the answer is finished.
    pub async fn next(&mut self) -> Option<ChatEvent> {
        self.events.recv().await
    }

    /// Wait for the answer and return the stored assistant message.
    pub async fn finish(self) -> Result<Message> {
        self.task
            .await
            .map_err(|e| StudioError::internal(format!("Chat task failed: {}", e)))?
    }
}

/// System prompt around the retrieved context.
pub fn system_prompt(context: &str) -> String {
    let context = if context.is_empty() {
        "No document context available."
    } else {
        context
    };

    format!(
        "You are a helpful AI assistant that answers questions based on document context.\n\n\
         {}\n\n\
         IMPORTANT INSTRUCTIONS:\n\
         - Extract specific facts, numbers, and details from the context above\n\
         - If the context contains the answer, provide the exact information\n\
         - Quote specific amounts, percentages, and figures when available\n\
         - If the context doesn't contain the requested information, clearly state this\n\
         - Always base your answers on the provided context, not general knowledge",
        context
    )
}

fn with_id(mut message: Message) -> Message {
    if message.id.trim().is_empty() {
        message.id = new_message_id();
    }
    message
}

impl StudioService {
    /// Answer the latest user message using the document as context.
    pub async fn chat(&self, request: ChatRequest) -> Result<ChatStream> {
        let document_id = request.document_id.trim().to_string();
        if document_id.is_empty() {
            return Err(StudioError::invalid_argument("Document ID is required"));
        }
        let conversation_id = request
            .conversation_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| document_id.clone());

        let model = self
            .chat_model
            .clone()
            .ok_or_else(|| StudioError::config("OPENAI_API_KEY is not set"))?;

        // `to_store` is what gets appended; `history` is what the model sees
        let (to_store, history) = match (request.message, request.messages) {
            (Some(message), _) => {
                let message = with_id(message);
                let mut history = self.documents.load_messages(&conversation_id).await?;
                history.retain(|m| m.id != message.id);
                history.push(message.clone());
                (vec![message], history)
            }
            (None, Some(messages)) if !messages.is_empty() => {
                let messages: Vec<Message> = messages.into_iter().map(with_id).collect();
                (messages.clone(), messages)
            }
            _ => return Err(StudioError::invalid_argument("No messages provided")),
        };

        let query = history
            .last()
            .and_then(|m| m.first_text())
            .unwrap_or_default()
            .to_string();

        let context = match self.documents.get_document(&document_id).await {
            Ok(Some(doc)) => self.assembler.assemble(&query, &doc.id, &doc.title).await,
            Ok(None) => {
                debug!("Document {} not found, answering without context", document_id);
                Default::default()
            }
            Err(e) => {
                warn!("Document lookup for {} failed: {}", document_id, e);
                Default::default()
            }
        };

        let prompt = ChatPrompt {
            system: Some(system_prompt(&context.text)),
            turns: history.iter().map(ChatTurn::from).collect(),
            temperature: self.temperature,
            max_tokens: None,
            json_output: false,
        };

        info!(
            "Chat on {} with {} turns and {} sources",
            document_id,
            prompt.turns.len(),
            context.sources.len()
        );

        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_completion(
            model,
            self.documents.clone(),
            conversation_id.clone(),
            prompt,
            to_store,
            context.sources.clone(),
            tx,
        ));

        Ok(ChatStream {
            conversation_id,
            sources: context.sources,
            events: rx,
            task,
        })
    }
}

async fn run_completion(
    model: Arc<dyn ChatModel>,
    documents: Arc<dyn DocumentStore>,
    conversation_id: String,
    prompt: ChatPrompt,
    mut to_store: Vec<Message>,
    sources: Vec<ContextSource>,
    tx: mpsc::UnboundedSender<ChatEvent>,
) -> Result<Message> {
    // Send errors only mean the receiver is gone
    let delta_tx = tx.clone();
    let on_delta = move |delta: &str| {
        let _ = delta_tx.send(ChatEvent::Delta(delta.to_string()));
    };

    let answer = match model.stream(&prompt, &on_delta).await {
        Ok(answer) => answer,
        Err(e) => {
            error!("Chat completion with {} failed: {}", model.model(), e);
            let _ = tx.send(ChatEvent::Error(e.to_string()));
            return Err(e);
        }
    };

    let reply = Message::assistant(answer);
    to_store.push(reply.clone());
    if let Err(e) = documents.append_messages(&conversation_id, &to_store).await {
        error!("Saving conversation {} failed: {}", conversation_id, e);
    }

    let _ = tx.send(ChatEvent::Done {
        message: reply.clone(),
        sources,
    });
    Ok(reply)
}
