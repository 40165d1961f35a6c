//! Multi-line dialogue synthesis.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use studio_core::{Result, RetryPolicy, StudioError};
use studio_providers::SpeechSynthesizer;

/// One line of a scripted conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueLine {
    pub speaker: String,
    pub emotion: String,
    pub text: String,
    pub filename: String,
}

impl DialogueLine {
    fn new(speaker: &str, emotion: &str, text: &str, filename: &str) -> Self {
        Self {
            speaker: speaker.to_string(),
            emotion: emotion.to_string(),
            text: text.to_string(),
            filename: filename.to_string(),
        }
    }
}

/// The built-in two-speaker script.
pub fn sample_conversation() -> Vec<DialogueLine> {
    vec![
        DialogueLine::new(
            "Alex",
            "excited",
            "Hey! You won't believe what just happened! I got the job at Google!",
            "01_alex_excited.wav",
        ),
        DialogueLine::new(
            "Sam",
            "surprised_happy",
            "Oh my goodness, Alex! That's absolutely incredible news! I knew you could do it!",
            "02_sam_surprised.wav",
        ),
        DialogueLine::new(
            "Alex",
            "nervous",
            "Thanks! But honestly, I'm a bit nervous. It's a huge responsibility, you know?",
            "03_alex_nervous.wav",
        ),
        DialogueLine::new(
            "Sam",
            "reassuring",
            "Don't worry about it. You've worked so hard for this. You're going to do amazing things there.",
            "04_sam_reassuring.wav",
        ),
        DialogueLine::new(
            "Alex",
            "grateful",
            "You're right. Thanks for always believing in me. It really means a lot.",
            "05_alex_grateful.wav",
        ),
        DialogueLine::new(
            "Sam",
            "cheerful",
            "That's what friends are for! Now, let's go celebrate! Dinner is on me tonight!",
            "06_sam_cheerful.wav",
        ),
        DialogueLine::new(
            "Alex",
            "happy",
            "You're the best! Let's do it! I'm thinking pizza and ice cream!",
            "07_alex_happy.wav",
        ),
        DialogueLine::new(
            "Sam",
            "laughing",
            "Ha ha! Classic Alex! Pizza and ice cream it is then!",
            "08_sam_laughing.wav",
        ),
    ]
}

/// Read a script from a JSON array of lines.
pub fn load_script(path: &Path) -> Result<Vec<DialogueLine>> {
    let content = std::fs::read_to_string(path)?;
    let lines: Vec<DialogueLine> = serde_json::from_str(&content)?;
    if lines.is_empty() {
        return Err(StudioError::invalid_argument("Script has no lines"));
    }
    Ok(lines)
}

/// Synthesizes a script line by line into an output directory.
pub struct SpeechJob {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    output_dir: PathBuf,
    retry: RetryPolicy,
}

impl SpeechJob {
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            synthesizer,
            output_dir: output_dir.into(),
            retry: RetryPolicy::rate_limited(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Output path for a line, using the synthesizer's audio format.
    fn output_path(&self, line: &DialogueLine) -> PathBuf {
        self.output_dir
            .join(&line.filename)
            .with_extension(self.synthesizer.audio_extension())
    }

    /// Synthesize every line in order. The first failure aborts the job.
    pub async fn run(&self, lines: &[DialogueLine]) -> Result<Vec<PathBuf>> {
        tokio::fs::create_dir_all(&self.output_dir).await?;

        let mut written = Vec::with_capacity(lines.len());
        for line in lines {
            info!("[{}] ({}) \"{}\"", line.speaker, line.emotion, line.text);

            let audio = self
                .retry
                .run("synthesize speech", || self.synthesizer.synthesize(&line.text))
                .await
                .map_err(|e| {
                    error!("Speech for {} failed: {}", line.filename, e);
                    e
                })?;

            let path = self.output_path(line);
            tokio::fs::write(&path, &audio).await?;
            info!("Saved {}", path.display());
            written.push(path);
        }

        info!(
            "Generated {} audio files in {}",
            written.len(),
            self.output_dir.display()
        );
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records requests; fails on lines containing `fail_on`.
    struct ScriptedVoice {
        spoken: Mutex<Vec<String>>,
        fail_on: Option<&'static str>,
    }

    impl ScriptedVoice {
        fn new(fail_on: Option<&'static str>) -> Self {
            Self {
                spoken: Mutex::new(Vec::new()),
                fail_on,
            }
        }
    }

    #[async_trait]
    impl SpeechSynthesizer for ScriptedVoice {
        fn model(&self) -> &str {
            "test-voice"
        }

        fn audio_extension(&self) -> &str {
            "wav"
        }

        async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
            self.spoken.lock().unwrap().push(text.to_string());
            match self.fail_on {
                Some(marker) if text.contains(marker) => Err(StudioError::from_status(
                    "replicate",
                    422,
                    None,
                    "invalid speaker".to_string(),
                )),
                _ => Ok(text.as_bytes().to_vec()),
            }
        }
    }

    #[tokio::test]
    async fn test_writes_every_line_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let voice = Arc::new(ScriptedVoice::new(None));
        let job = SpeechJob::new(voice.clone(), dir.path().join("assets"));

        let script = sample_conversation();
        let written = job.run(&script).await.unwrap();

        assert_eq!(written.len(), 8);
        assert_eq!(written[0], dir.path().join("assets").join("01_alex_excited.wav"));
        assert_eq!(voice.spoken.lock().unwrap()[7], script[7].text);
        assert_eq!(
            std::fs::read(&written[1]).unwrap(),
            script[1].text.as_bytes()
        );
    }

    #[tokio::test]
    async fn test_first_failure_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let voice = Arc::new(ScriptedVoice::new(Some("nervous")));
        let job = SpeechJob::new(voice.clone(), dir.path());

        let script = vec![
            DialogueLine::new("Alex", "calm", "Hello there.", "01.wav"),
            DialogueLine::new("Sam", "nervous", "I am nervous.", "02.wav"),
            DialogueLine::new("Alex", "calm", "Never spoken.", "03.wav"),
        ];
        let err = job.run(&script).await.unwrap_err();

        assert!(err.to_string().contains("invalid speaker"));
        assert_eq!(voice.spoken.lock().unwrap().len(), 2);
        assert!(dir.path().join("01.wav").exists());
        assert!(!dir.path().join("03.wav").exists());
    }

    #[test]
    fn test_load_script() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("script.json");
        std::fs::write(
            &path,
            r#"[{"speaker":"Ana","emotion":"calm","text":"Hi","filename":"01_ana.wav"}]"#,
        )
        .unwrap();

        let lines = load_script(&path).unwrap();
        assert_eq!(lines[0].speaker, "Ana");

        std::fs::write(&path, "[]").unwrap();
        assert!(load_script(&path).is_err());
    }
}
