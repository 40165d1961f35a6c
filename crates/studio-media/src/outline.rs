//! Blog outline assistant with follow-up questions.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use studio_core::{ChatModel, ChatPrompt, ChatTurn, DeltaFn, Result, RetryPolicy, Role, StudioError};

const OUTLINE_SYSTEM: &str = "You are an expert content strategist. Create a detailed blog post \
outline for the given topic.\nInclude:\n- A compelling title\n- Introduction hook\n- 5-7 main \
sections with bullet points\n- Key takeaways\n- Conclusion";

const SUMMARY_SYSTEM: &str = "You are a concise summarizer. Summarize content in exactly 2 sentences.";

const FOLLOW_UP_SYSTEM: &str = "You are an expert content strategist.";

/// Sampling preset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentMode {
    Creative,
    #[default]
    Balanced,
    Factual,
}

impl ContentMode {
    pub fn temperature(&self) -> f32 {
        match self {
            Self::Creative => 0.9,
            Self::Balanced => 0.7,
            Self::Factual => 0.3,
        }
    }
}

/// Streams an outline, its summary and answers about it.
///
/// Outline requests and follow-ups are kept as history and replayed to the
/// model for later questions; summaries are not.
pub struct OutlineJob {
    model: Arc<dyn ChatModel>,
    mode: ContentMode,
    retry: RetryPolicy,
    history: Vec<ChatTurn>,
}

impl OutlineJob {
    pub fn new(model: Arc<dyn ChatModel>, mode: ContentMode) -> Self {
        Self {
            model,
            mode,
            retry: RetryPolicy::rate_limited(),
            history: Vec::new(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }

    fn prompt(&self, system: &str, turns: Vec<ChatTurn>, max_tokens: u32) -> ChatPrompt {
        ChatPrompt {
            system: Some(system.to_string()),
            turns,
            temperature: self.mode.temperature(),
            max_tokens: Some(max_tokens),
            json_output: false,
        }
    }

    async fn stream(
        &self,
        label: &str,
        prompt: &ChatPrompt,
        on_delta: &DeltaFn,
    ) -> Result<String> {
        self.retry
            .run(label, || self.model.stream(prompt, on_delta))
            .await
    }

    fn remember(&mut self, question: String, answer: &str) {
        self.history.push(ChatTurn {
            role: Role::User,
            content: question,
        });
        self.history.push(ChatTurn {
            role: Role::Assistant,
            content: answer.to_string(),
        });
    }

    /// Stream a blog outline for `topic`.
    pub async fn outline(
        &mut self,
        topic: &str,
        on_delta: &DeltaFn,
    ) -> Result<String> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(StudioError::invalid_argument("No topic provided"));
        }

        info!("Generating outline for {}", topic);
        let request = format!("Create a blog post outline for: {}", topic);
        let prompt = self.prompt(
            OUTLINE_SYSTEM,
            vec![ChatTurn {
                role: Role::User,
                content: request.clone(),
            }],
            1000,
        );

        let outline = self.stream("outline", &prompt, on_delta).await?;
        self.remember(request, &outline);
        Ok(outline)
    }

    /// Stream a two-sentence summary of `outline`.
    pub async fn summarize(
        &self,
        outline: &str,
        on_delta: &DeltaFn,
    ) -> Result<String> {
        let prompt = self.prompt(
            SUMMARY_SYSTEM,
            vec![ChatTurn {
                role: Role::User,
                content: format!(
                    "Summarize this blog outline in exactly 2 sentences:\n\n{}",
                    outline
                ),
            }],
            200,
        );
        self.stream("summarize", &prompt, on_delta).await
    }

    /// Answer a question with the conversation so far as context.
    pub async fn follow_up(
        &mut self,
        question: &str,
        on_delta: &DeltaFn,
    ) -> Result<String> {
        let question = question.trim();
        if question.is_empty() {
            return Err(StudioError::invalid_argument("Question is empty"));
        }

        let mut turns = self.history.clone();
        turns.push(ChatTurn {
            role: Role::User,
            content: question.to_string(),
        });
        let prompt = self.prompt(FOLLOW_UP_SYSTEM, turns, 500);

        let answer = self.stream("follow-up", &prompt, on_delta).await?;
        self.remember(question.to_string(), &answer);
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Streams a canned reply word by word and records prompts.
    struct CannedModel {
        prompts: Mutex<Vec<ChatPrompt>>,
    }

    #[async_trait]
    impl ChatModel for CannedModel {
        fn model(&self) -> &str {
            "canned"
        }

        async fn complete(&self, prompt: &ChatPrompt) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.clone());
            Ok(format!("reply {}", self.prompts.lock().unwrap().len()))
        }

        async fn stream(
            &self,
            prompt: &ChatPrompt,
            on_delta: &DeltaFn,
        ) -> Result<String> {
            let text = self.complete(prompt).await?;
            for word in text.split_inclusive(' ') {
                on_delta(word);
            }
            Ok(text)
        }
    }

    fn model() -> Arc<CannedModel> {
        Arc::new(CannedModel {
            prompts: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn test_outline_streams_and_keeps_history() {
        let model = model();
        let mut job = OutlineJob::new(model.clone(), ContentMode::Creative);

        let streamed = Arc::new(Mutex::new(String::new()));
        let sink = streamed.clone();
        let outline = job
            .outline("Rust in production", &move |d: &str| sink.lock().unwrap().push_str(d))
            .await
            .unwrap();

        assert_eq!(outline, "reply 1");
        assert_eq!(*streamed.lock().unwrap(), "reply 1");
        assert_eq!(job.history().len(), 2);
        assert_eq!(
            job.history()[0].content,
            "Create a blog post outline for: Rust in production"
        );

        let prompts = model.prompts.lock().unwrap();
        let prompt = &prompts[0];
        assert_eq!(prompt.max_tokens, Some(1000));
        assert!((prompt.temperature - 0.9).abs() < 1e-6);
        assert!(prompt.system.as_deref().unwrap().contains("5-7 main sections"));
    }

    #[tokio::test]
    async fn test_summary_is_not_remembered() {
        let model = model();
        let mut job = OutlineJob::new(model.clone(), ContentMode::Balanced);

        let outline = job.outline("Tea", &|_: &str| {}).await.unwrap();
        job.summarize(&outline, &|_: &str| {}).await.unwrap();

        assert_eq!(job.history().len(), 2);
        let prompts = model.prompts.lock().unwrap();
        let prompt = &prompts[1];
        assert_eq!(prompt.max_tokens, Some(200));
        assert!(prompt.turns[0].content.ends_with("\n\nreply 1"));
    }

    #[tokio::test]
    async fn test_follow_up_replays_history() {
        let model = model();
        let mut job = OutlineJob::new(model.clone(), ContentMode::Factual);

        job.outline("Tea", &|_: &str| {}).await.unwrap();
        let answer = job.follow_up("Which section first?", &|_: &str| {}).await.unwrap();

        assert_eq!(answer, "reply 2");
        assert_eq!(job.history().len(), 4);

        let prompts = model.prompts.lock().unwrap();
        let prompt = &prompts[1];
        assert_eq!(prompt.turns.len(), 3);
        assert_eq!(prompt.turns[1].role, Role::Assistant);
        assert_eq!(prompt.turns[2].content, "Which section first?");
    }

    #[tokio::test]
    async fn test_empty_topic_rejected() {
        let mut job = OutlineJob::new(model(), ContentMode::default());
        assert!(job.outline("  ", &|_: &str| {}).await.is_err());
        assert!(job.history().is_empty());
    }

    #[test]
    fn test_mode_temperature() {
        assert_eq!(ContentMode::default(), ContentMode::Balanced);
        assert!((ContentMode::Factual.temperature() - 0.3).abs() < 1e-6);
    }
}
