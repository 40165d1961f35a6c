//! Studio CLI - Command-line interface for genai-studio.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use studio_core::{ApiKeys, ChatModel, StudioConfig};
use studio_media::{
    load_script, sample_conversation, ContentMode, ContentStudio, CostTracker, ImageBatch,
    OutlineJob, SpeechJob, DEFAULT_TOPIC,
};
use studio_providers::{
    ImageGenerator, OpenAiChat, OpenAiConfig, OpenAiImages, OpenAiSpeech, ReplicateChat,
    ReplicateClient, ReplicateImages, ReplicateSpeech, SpeechSynthesizer,
};
use studio_service::{
    ensure_vector_index, ChatEvent, ChatRequest, StudioService, UploadFile, VideoUpload,
    WorkflowEvent,
};
use studio_store::SqliteStore;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Studio - Document chat and batch media generation
#[derive(Parser)]
#[command(name = "studio")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database path (overrides the configuration file)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Configuration file (default: platform config dir, then ./studio.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database (and the hosted vector index)
    Init {
        /// Create the vector index if it does not exist
        #[arg(long)]
        create_index: bool,
    },

    /// Upload a PDF, DOCX, TXT or MD file
    Upload {
        /// File to upload
        path: PathBuf,
    },

    /// Ingest a YouTube video through its captions
    Video {
        /// Video URL
        url: String,

        /// Transcript file used when captions cannot be fetched
        #[arg(long)]
        transcript: Option<PathBuf>,
    },

    /// Manage documents
    Docs {
        #[command(subcommand)]
        action: DocsAction,
    },

    /// Ask a question about a document
    Chat {
        /// Document ID
        document_id: String,

        /// Question
        question: String,
    },

    /// Show the stored conversation of a document
    History {
        /// Conversation (document) ID
        conversation_id: String,
    },

    /// Send an event to the workflow platform
    Trigger {
        /// Event name
        name: String,

        /// Event data as JSON
        #[arg(long)]
        data: Option<String>,
    },

    /// Generate a batch of images for a theme
    Images {
        /// Theme to illustrate
        theme: String,

        #[arg(long, value_enum, default_value = "replicate")]
        provider: Provider,
    },

    /// Write an article with header, thumbnail and narration (OpenAI)
    Content {
        /// Topic; with --batch, every topic in turn
        topics: Vec<String>,

        /// Process every topic given
        #[arg(long)]
        batch: bool,
    },

    /// Synthesize a scripted conversation
    Speak {
        /// JSON script (default: built-in two-speaker conversation)
        #[arg(long)]
        script: Option<PathBuf>,

        /// Output directory (default: <output_dir>/audio)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long, value_enum, default_value = "replicate")]
        provider: Provider,
    },

    /// Stream a blog outline and its summary
    Outline {
        /// Blog topic
        topic: String,

        #[arg(long, value_enum, default_value = "balanced")]
        mode: Mode,

        /// Follow-up questions, asked in order
        #[arg(long = "ask")]
        questions: Vec<String>,

        #[arg(long, value_enum, default_value = "replicate")]
        provider: Provider,
    },

    /// Show statistics
    Stats,
}

#[derive(Subcommand)]
enum DocsAction {
    /// List all documents
    List,

    /// Delete a document with its vectors and conversation
    Delete {
        /// Document ID
        id: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Provider {
    Replicate,
    Openai,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    Creative,
    Balanced,
    Factual,
}

impl From<Mode> for ContentMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Creative => ContentMode::Creative,
            Mode::Balanced => ContentMode::Balanced,
            Mode::Factual => ContentMode::Factual,
        }
    }
}

fn setup_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

fn load_config(cli: &Cli) -> CliResult<StudioConfig> {
    let mut config = match &cli.config {
        Some(path) => StudioConfig::load(path)?,
        None => StudioConfig::load_default()?,
    };
    if let Some(path) = &cli.database {
        config.database.path = path.clone();
    }
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> CliResult<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let config = load_config(&cli)?;
    let keys = ApiKeys::from_env();

    match cli.command {
        Commands::Init { create_index } => {
            init(&config, &keys, create_index).await?;
        }
        Commands::Upload { path } => {
            let service = StudioService::from_config(&config, &keys).await?;
            upload(&service, &path).await?;
        }
        Commands::Video { url, transcript } => {
            let service = StudioService::from_config(&config, &keys).await?;
            let manual_transcript = match transcript {
                Some(path) => Some(std::fs::read_to_string(path)?),
                None => None,
            };
            let response = service
                .upload_video(VideoUpload {
                    url,
                    manual_transcript,
                })
                .await?;
            print_json(&response)?;
        }
        Commands::Docs { action } => {
            let service = StudioService::from_config(&config, &keys).await?;
            match action {
                DocsAction::List => list_documents(&service).await?,
                DocsAction::Delete { id } => {
                    let ack = service.delete_document(&id).await?;
                    println!("{}", ack.message);
                }
            }
        }
        Commands::Chat {
            document_id,
            question,
        } => {
            let service = StudioService::from_config(&config, &keys).await?;
            chat(&service, document_id, question).await?;
        }
        Commands::History { conversation_id } => {
            let service = StudioService::from_config(&config, &keys).await?;
            for message in service.get_messages(&conversation_id).await? {
                println!("[{}] {}", message.role.as_str(), message.joined_text());
            }
        }
        Commands::Trigger { name, data } => {
            let service = StudioService::from_config(&config, &keys).await?;
            let data = match data {
                Some(raw) => Some(serde_json::from_str(&raw)?),
                None => None,
            };
            let response = service.trigger_workflow(WorkflowEvent { name, data }).await?;
            print_json(&response)?;
        }
        Commands::Images { theme, provider } => {
            images(&config, &keys, &theme, provider).await?;
        }
        Commands::Content { topics, batch } => {
            content(&config, &keys, topics, batch).await?;
        }
        Commands::Speak {
            script,
            output,
            provider,
        } => {
            speak(&config, &keys, script.as_deref(), output, provider).await?;
        }
        Commands::Outline {
            topic,
            mode,
            questions,
            provider,
        } => {
            outline(&config, &keys, &topic, mode, &questions, provider).await?;
        }
        Commands::Stats => {
            let service = StudioService::from_config(&config, &keys).await?;
            print_json(&service.stats().await?)?;
        }
    }

    Ok(())
}

async fn init(config: &StudioConfig, keys: &ApiKeys, create_index: bool) -> CliResult<()> {
    let store = SqliteStore::open_with_timeout(
        &config.database.path,
        config.database.busy_timeout_ms,
    )?;
    println!(
        "Initialized database at: {} (schema v{})",
        config.database.path.display(),
        store.schema_version()?
    );

    if create_index {
        let created = ensure_vector_index(keys, config).await?;
        if created {
            println!("Created vector index {}", config.vector_store.index_name);
        } else {
            println!("Vector index {} already exists", config.vector_store.index_name);
        }
    }
    Ok(())
}

async fn upload(service: &StudioService, path: &Path) -> CliResult<()> {
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();
    let bytes = std::fs::read(path)?;

    let response = service.upload_file(UploadFile { filename, bytes }).await?;
    print_json(&response)
}

async fn list_documents(service: &StudioService) -> CliResult<()> {
    let documents = service.list_documents().await?;
    if documents.is_empty() {
        println!("No documents.");
        return Ok(());
    }

    for doc in documents {
        println!(
            "{}  {:<10} {:<8} {}  ({} chunks)",
            doc.id,
            doc.status.as_str(),
            doc.file_type.as_str(),
            doc.title,
            doc.chunk_count.unwrap_or(0)
        );
        if let Some(message) = &doc.error_message {
            println!("    error: {}", message);
        }
    }
    Ok(())
}

async fn chat(service: &StudioService, document_id: String, question: String) -> CliResult<()> {
    let mut stream = service
        .chat(ChatRequest {
            document_id,
            message: Some(studio_core::Message::user(question)),
            ..Default::default()
        })
        .await?;

    let mut stdout = std::io::stdout();
    while let Some(event) = stream.next().await {
        match event {
            ChatEvent::Delta(delta) => {
                print!("{}", delta);
                stdout.flush()?;
            }
            ChatEvent::Done { sources, .. } => {
                println!();
                for (i, source) in sources.iter().enumerate() {
                    println!(
                        "  [Source {}] {} ({:.4})",
                        i + 1,
                        source.chunk_id,
                        source.similarity
                    );
                }
            }
            ChatEvent::Error(message) => eprintln!("\nError: {}", message),
        }
    }

    stream.finish().await?;
    Ok(())
}

fn replicate_client(keys: &ApiKeys) -> CliResult<ReplicateClient> {
    let token = ApiKeys::require(&keys.replicate, "REPLICATE_API_TOKEN")?;
    Ok(ReplicateClient::new(token)?)
}

fn openai_config(keys: &ApiKeys, config: &StudioConfig) -> CliResult<OpenAiConfig> {
    let key = ApiKeys::require(&keys.openai, "OPENAI_API_KEY")?;
    Ok(OpenAiConfig::new(&config.chat.base_url, key))
}

/// Chat model for media jobs; `openai_model` applies to the OpenAI provider.
fn media_chat_model(
    keys: &ApiKeys,
    config: &StudioConfig,
    provider: Provider,
    replicate_model: &str,
    openai_model: &str,
) -> CliResult<Arc<dyn ChatModel>> {
    Ok(match provider {
        Provider::Replicate => Arc::new(ReplicateChat::new(replicate_client(keys)?, replicate_model)),
        Provider::Openai => Arc::new(OpenAiChat::new(openai_config(keys, config)?, openai_model)?),
    })
}

async fn images(
    config: &StudioConfig,
    keys: &ApiKeys,
    theme: &str,
    provider: Provider,
) -> CliResult<()> {
    let mut media = config.media.clone();
    let prompt_model = media_chat_model(keys, config, provider, &media.prompt_model, "gpt-4o")?;
    let generator: Arc<dyn ImageGenerator> = match provider {
        Provider::Replicate => Arc::new(ReplicateImages::new(
            replicate_client(keys)?,
            media.image_model.as_str(),
        )),
        Provider::Openai => {
            media.image_sizes = vec![
                "1024x1024".to_string(),
                "1792x1024".to_string(),
                "1024x1792".to_string(),
            ];
            Arc::new(OpenAiImages::new(openai_config(keys, config)?, "dall-e-3")?)
        }
    };

    let batch = ImageBatch::new(prompt_model, generator, &media)?
        .with_retry(config.retry.policy())
        .with_costs(CostTracker::with_defaults());

    info!("Generating {} images for {}", media.image_sizes.len(), theme);
    let report = batch.run(theme).await?;

    for result in &report.results {
        match (&result.filename, &result.error) {
            (Some(filename), _) => println!("  {} -> {}", result.params.size, filename),
            (None, Some(error)) => println!("  {} failed: {}", result.params.size, error),
            (None, None) => println!("  {} failed", result.params.size),
        }
    }
    println!(
        "{}/{} images, estimated cost ${:.4}, saved under {}",
        report.succeeded(),
        report.results.len(),
        report.total_cost,
        batch.batch_dir().display()
    );
    Ok(())
}

async fn content(
    config: &StudioConfig,
    keys: &ApiKeys,
    topics: Vec<String>,
    batch: bool,
) -> CliResult<()> {
    let openai = openai_config(keys, config)?;
    let studio = ContentStudio::new(
        Arc::new(OpenAiChat::new(openai.clone(), "gpt-4o")?),
        Arc::new(OpenAiImages::new(openai.clone(), "dall-e-3")?),
        Arc::new(OpenAiSpeech::new(openai, "tts-1", "alloy")?),
        &config.media.output_dir,
    );

    let topics = if batch {
        if topics.is_empty() {
            return Err("--batch needs at least one topic".into());
        }
        topics
    } else {
        vec![topics
            .into_iter()
            .next()
            .unwrap_or_else(|| DEFAULT_TOPIC.to_string())]
    };

    for report in studio.run_batch(&topics).await? {
        println!("--- {} ---", report.topic);
        if report.used_fallback {
            println!("  content generation failed, placeholder written");
        }
        for file in &report.files {
            println!("  {}", report.output_dir.join(file).display());
        }
        println!(
            "  {:.2}s, {} operations, estimated cost ${:.4}",
            report.duration_secs, report.operations, report.total_cost
        );
    }
    Ok(())
}

async fn speak(
    config: &StudioConfig,
    keys: &ApiKeys,
    script: Option<&Path>,
    output: Option<PathBuf>,
    provider: Provider,
) -> CliResult<()> {
    let lines = match script {
        Some(path) => load_script(path)?,
        None => sample_conversation(),
    };

    let synthesizer: Arc<dyn SpeechSynthesizer> = match provider {
        Provider::Replicate => Arc::new(ReplicateSpeech::new(
            replicate_client(keys)?,
            config.media.speech_model.as_str(),
            config.media.speaker_voice.as_str(),
        )),
        Provider::Openai => Arc::new(OpenAiSpeech::new(
            openai_config(keys, config)?,
            "tts-1",
            "alloy",
        )?),
    };

    let output = output.unwrap_or_else(|| config.media.output_dir.join("audio"));
    let job = SpeechJob::new(synthesizer, output).with_retry(config.retry.policy());

    for path in job.run(&lines).await? {
        println!("  {}", path.display());
    }
    Ok(())
}

async fn outline(
    config: &StudioConfig,
    keys: &ApiKeys,
    topic: &str,
    mode: Mode,
    questions: &[String],
    provider: Provider,
) -> CliResult<()> {
    let model = media_chat_model(
        keys,
        config,
        provider,
        &config.media.outline_model,
        &config.chat.model,
    )?;
    let mut job = OutlineJob::new(model, mode.into()).with_retry(config.retry.policy());

    let print_delta = |delta: &str| {
        print!("{}", delta);
        std::io::stdout().flush().ok();
    };

    let outline = job.outline(topic, &print_delta).await?;

    println!("\n\n--- Summary ---");
    job.summarize(&outline, &print_delta).await?;

    for question in questions {
        println!("\n\n--- {} ---", question);
        job.follow_up(question, &print_delta).await?;
    }
    println!();
    Ok(())
}
