use chrono::Utc;
use clap::{Parser, Subcommand};
use local_rag_core::{
    create_query_engine, load_documents, Embedder, EmbeddingModel, HashingEmbedder, HttpTranslator,
    IndexBuilder, LanguageModel, NoopTranslator, OllamaClient, OllamaEmbedder, ResponseMode,
    SessionContext, Settings, Translator,
};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "local-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Ollama endpoint
    #[arg(long, env = "OLLAMA_ENDPOINT", default_value = "http://localhost:11434")]
    endpoint: String,

    /// Chat model served by the endpoint
    #[arg(long, env = "OLLAMA_MODEL", default_value = "llama3")]
    model: String,

    /// Embedding model: default, large, paraphrase-multilingual-MiniLM-L12-v2,
    /// RoSEtta-base-ja, or other:<name>
    #[arg(long, default_value = "default")]
    embedding_model: String,

    /// Use the in-process hashing embedder instead of the endpoint
    #[arg(long, default_value_t = false)]
    offline_embeddings: bool,

    /// Characters per embedded chunk
    #[arg(long, default_value = "1024")]
    chunk_size: usize,

    /// Characters shared between consecutive chunks
    #[arg(long, default_value = "200")]
    chunk_overlap: usize,

    /// Number of most similar chunks retrieved per query (0-10)
    #[arg(long, default_value = "3")]
    top_k: usize,

    /// Response composition: compact, refine, tree_summarize,
    /// simple_summarize, accumulate, compact_accumulate
    #[arg(long, default_value = "compact")]
    response_mode: String,

    /// Persisted vector store directory
    #[arg(long, default_value = "./vectordb")]
    vectordb: PathBuf,

    /// Staging directory with uploaded files
    #[arg(long, default_value = "./data")]
    staging: PathBuf,

    /// Translate input before retrieval
    #[arg(long, default_value_t = false)]
    translate: bool,

    /// Translation target language
    #[arg(long, default_value = "ja")]
    translate_target: String,

    /// Translation service endpoint
    #[arg(long)]
    translate_endpoint: Option<String>,

    /// Print the resolved configuration at startup
    #[arg(long, default_value_t = false)]
    advanced: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Load staged documents, build the index, and persist it.
    Ingest,
    /// Chat against the index: builds from staging when files are present,
    /// otherwise loads the persisted store.
    Chat {
        /// One-shot question; omit for the interactive loop.
        #[arg(long)]
        question: Option<String>,
    },
    /// List models available at the endpoint.
    Models,
}

impl Cli {
    fn settings(&self) -> anyhow::Result<Settings> {
        let embedding_model: EmbeddingModel = self
            .embedding_model
            .parse()
            .map_err(|error| anyhow::anyhow!("{error}"))?;
        let response_mode: ResponseMode = self
            .response_mode
            .parse()
            .map_err(|error| anyhow::anyhow!("{error}"))?;

        let settings = Settings {
            ollama_endpoint: self.endpoint.clone(),
            model: self.model.clone(),
            embedding_model,
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            top_k: self.top_k,
            response_mode,
            vectorstore_path: self.vectordb.clone(),
            staging_dir: self.staging.clone(),
            translate_input: self.translate,
            translation_target: self.translate_target.clone(),
            translation_endpoint: self.translate_endpoint.clone(),
            advanced: self.advanced,
        };

        settings
            .validate()
            .map_err(|error| anyhow::anyhow!("{error}"))?;

        if settings.translate_input && settings.translation_endpoint.is_none() {
            anyhow::bail!("--translate requires --translate-endpoint");
        }

        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let settings = cli.settings()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        "local-rag boot"
    );

    if settings.advanced {
        println!("resolved settings: {settings:#?}");
    }

    match cli.command {
        Command::Ingest => {
            if cli.offline_embeddings {
                run_ingest(HashingEmbedder::default(), &settings).await?;
            } else {
                run_ingest(endpoint_embedder(&settings), &settings).await?;
            }
        }
        Command::Chat { question } => {
            if cli.offline_embeddings {
                run_chat(HashingEmbedder::default(), settings, question).await?;
            } else {
                run_chat(endpoint_embedder(&settings), settings, question).await?;
            }
        }
        Command::Models => {
            let client = OllamaClient::new(&settings.ollama_endpoint, &settings.model);
            let models = client
                .list_models()
                .await
                .map_err(|error| anyhow::anyhow!("{error}"))?;

            if models.is_empty() {
                println!("no models available at {}", settings.ollama_endpoint);
            }
            for model in models {
                println!("{model}");
            }
        }
    }

    Ok(())
}

fn endpoint_embedder(settings: &Settings) -> OllamaEmbedder {
    OllamaEmbedder::new(
        settings.ollama_endpoint.clone(),
        settings.embedding_model.model_name().to_string(),
        settings.embedding_model.dimensions(),
    )
}

fn has_staged_files(dir: &Path) -> anyhow::Result<bool> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(error) => return Err(error.into()),
    };

    for entry in entries.flatten() {
        let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
        let name = entry.file_name().to_string_lossy().to_string();
        if is_file && !name.starts_with(".gitkeep") {
            return Ok(true);
        }
    }
    Ok(false)
}

async fn run_ingest<E: Embedder>(embedder: E, settings: &Settings) -> anyhow::Result<()> {
    let documents =
        load_documents(&settings.staging_dir).map_err(|error| anyhow::anyhow!("{error}"))?;

    if documents.is_empty() {
        println!(
            "no documents staged in {}",
            settings.staging_dir.display()
        );
        return Ok(());
    }

    let mut builder = IndexBuilder::new(embedder, settings);
    let index = builder
        .build(&documents)
        .await
        .map_err(|error| anyhow::anyhow!("{error}"))?;
    index
        .persist(&settings.vectorstore_path)
        .map_err(|error| anyhow::anyhow!("{error}"))?;

    println!(
        "{} chunks indexed into {} at {}",
        index.len(),
        settings.vectorstore_path.display(),
        Utc::now().to_rfc3339()
    );
    Ok(())
}

async fn run_chat<E: Embedder + Clone + 'static>(
    embedder: E,
    settings: Settings,
    question: Option<String>,
) -> anyhow::Result<()> {
    let llm = OllamaClient::new(&settings.ollama_endpoint, &settings.model);

    let staged = has_staged_files(&settings.staging_dir)?;
    let mut builder = IndexBuilder::new(embedder.clone(), &settings);

    let index = if staged {
        let documents =
            load_documents(&settings.staging_dir).map_err(|error| anyhow::anyhow!("{error}"))?;
        let index = builder
            .build(&documents)
            .await
            .map_err(|error| anyhow::anyhow!("{error}"))?;
        index
            .persist(&settings.vectorstore_path)
            .map_err(|error| anyhow::anyhow!("{error}"))?;
        index
    } else {
        builder
            .load(&settings.vectorstore_path)
            .map_err(|error| anyhow::anyhow!("{error}"))?
    };

    let translator: Box<dyn Translator> = match &settings.translation_endpoint {
        Some(endpoint) if settings.translate_input => Box::new(HttpTranslator::new(
            endpoint.clone(),
            settings.translation_target.clone(),
        )),
        _ => Box::new(NoopTranslator),
    };

    let mut session = SessionContext::new(settings.clone(), translator);
    if !staged {
        session.mark_store_ready();
    }

    let engine = create_query_engine(index, &settings, embedder, llm)
        .map_err(|error| anyhow::anyhow!("{error}"))?;
    session.install_engine(engine);

    match question {
        Some(question) => {
            serve_turn(&mut session, &question).await;
        }
        None => {
            interactive_loop(&mut session).await?;
        }
    }

    Ok(())
}

async fn serve_turn<E: Embedder, L: LanguageModel>(
    session: &mut SessionContext<E, L>,
    input: &str,
) {
    match session.chat_turn(input).await {
        Ok(outcome) => {
            println!("{}", outcome.response);
            for (position, source) in outcome.sources.iter().enumerate() {
                println!(
                    "  [{}] {} (score {:.3}): {}",
                    position + 1,
                    source.file_name,
                    source.score,
                    source.snippet
                );
            }
        }
        Err(error) => {
            println!("warning: {error}");
        }
    }
}

async fn interactive_loop<E: Embedder, L: LanguageModel>(
    session: &mut SessionContext<E, L>,
) -> anyhow::Result<()> {
    println!("How can I help? (:reset, :export, :quit)");

    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();

        match input {
            "" => continue,
            ":quit" | ":exit" => break,
            ":reset" => {
                session.reset();
                println!("session cleared");
            }
            ":export" => match session.export_transcript() {
                Ok(export) => {
                    std::fs::write(&export.file_name, &export.json)?;
                    println!("transcript written to {}", export.file_name);
                }
                Err(error) => println!("warning: {error}"),
            },
            question => {
                serve_turn(session, question).await;
            }
        }
    }

    Ok(())
}
