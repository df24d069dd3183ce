use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use docinsight_core::{
    ingest_paths, CharacterNgramEmbedder, Embedder, Generator, IngestionReport, OllamaEmbedder,
    OllamaGenerator, QueryAnswer, RagConfig, RagError, RagSession, SharedSession,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "docinsight", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Embedding backend
    #[arg(long, value_enum, env = "DOCINSIGHT_EMBEDDER", default_value = "ngram")]
    embedder: EmbedderKind,

    /// Ollama base URL
    #[arg(long, env = "DOCINSIGHT_OLLAMA_URL", default_value = "http://localhost:11434/")]
    ollama_url: String,

    /// Ollama embedding model (must produce 384-dimensional vectors)
    #[arg(long, env = "DOCINSIGHT_EMBED_MODEL", default_value = "all-minilm")]
    embed_model: String,

    /// Ollama generation model
    #[arg(long, env = "DOCINSIGHT_GENERATE_MODEL", default_value = "llama3.2")]
    generate_model: String,

    /// Skip the generative model and answer extractively
    #[arg(long, default_value_t = false)]
    extractive_only: bool,

    /// Maximum characters per chunk
    #[arg(long, default_value = "1000")]
    chunk_size: usize,

    /// Characters shared between consecutive chunks
    #[arg(long, default_value = "200")]
    chunk_overlap: usize,
}

#[derive(Clone, Copy, ValueEnum)]
enum EmbedderKind {
    Ngram,
    Ollama,
}

#[derive(Subcommand)]
enum Command {
    /// Index documents and answer a single question.
    Ask {
        /// Files or folders to index.
        #[arg(long = "path", required = true)]
        paths: Vec<PathBuf>,
        /// Question to answer.
        #[arg(long)]
        question: String,
        /// Number of chunks to retrieve.
        #[arg(long, env = "DOCINSIGHT_TOP_K", default_value = "3")]
        top_k: usize,
    },
    /// Index documents, then answer questions read from stdin.
    Chat {
        /// Files or folders to index.
        #[arg(long = "path", required = true)]
        paths: Vec<PathBuf>,
        /// Number of chunks to retrieve.
        #[arg(long, env = "DOCINSIGHT_TOP_K", default_value = "3")]
        top_k: usize,
    },
    /// Print the chunks a set of documents would be indexed as.
    Chunks {
        /// Files or folders to inspect.
        #[arg(long = "path", required = true)]
        paths: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = RagConfig {
        chunk_size: cli.chunk_size,
        chunk_overlap: cli.chunk_overlap,
        ..RagConfig::default()
    };
    config.validate()?;

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "docinsight boot"
    );

    match &cli.command {
        Command::Chunks { paths } => {
            let report = ingest(paths.clone(), config).await?;
            for chunk in &report.chunks {
                println!("{} chars={}", chunk.source, chunk.content.chars().count());
            }
            println!("{} chunks from {} file(s)", report.chunks.len(), report.files.len());
        }
        Command::Ask {
            paths,
            question,
            top_k,
        } => {
            let session = build_session(&cli, config.clone()).await?;
            let report = ingest(paths.clone(), config).await?;
            session.index_documents(report.chunks).await?;

            let result = session.query(question.clone(), *top_k).await?;
            print_answer(&result);
        }
        Command::Chat { paths, top_k } => {
            let session = build_session(&cli, config.clone()).await?;
            let report = ingest(paths.clone(), config).await?;
            let indexed = session.index_documents(report.chunks).await?;
            println!(
                "{indexed} chunks indexed from {} file(s). Ask a question, `:status`, `:clear` or `:quit`.",
                report.files.len()
            );

            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Some(line) = lines.next_line().await? {
                let line = line.trim();
                match line {
                    "" => continue,
                    ":quit" => break,
                    ":clear" => {
                        session.session().clear()?;
                        println!("index cleared");
                    }
                    ":status" => {
                        let status = session.session().status()?;
                        println!(
                            "ready={} chunks={} mode={:?} indexed_at={}",
                            status.ready,
                            status.chunk_count,
                            status.answer_mode,
                            status
                                .indexed_at
                                .map(|at| at.to_rfc3339())
                                .unwrap_or_else(|| "-".to_string())
                        );
                    }
                    question => match session.query(question.to_string(), *top_k).await {
                        Ok(result) => print_answer(&result),
                        Err(RagError::NotIndexed) => {
                            println!("No documents uploaded yet");
                        }
                        Err(error) => return Err(error.into()),
                    },
                }
            }
        }
    }

    Ok(())
}

async fn ingest(paths: Vec<PathBuf>, config: RagConfig) -> anyhow::Result<IngestionReport> {
    let report = tokio::task::spawn_blocking(move || ingest_paths(&paths, &config)).await??;
    for file in &report.files {
        info!(
            path = %file.path.display(),
            checksum = %file.checksum,
            chunk_count = file.chunk_count,
            "ingested file"
        );
    }
    Ok(report)
}

/// Loads both models off the async runtime. A missing embedding model is
/// fatal; a missing generation model only disables the generative tier.
async fn build_session(cli: &Cli, config: RagConfig) -> anyhow::Result<SharedSession> {
    let embedder_kind = cli.embedder;
    let ollama_url = cli.ollama_url.clone();
    let embed_model = cli.embed_model.clone();
    let generate_model = (!cli.extractive_only).then(|| cli.generate_model.clone());

    let session = tokio::task::spawn_blocking(move || -> anyhow::Result<RagSession> {
        let embedder: Arc<dyn Embedder> = match embedder_kind {
            EmbedderKind::Ngram => Arc::new(CharacterNgramEmbedder {
                dimensions: config.embedding_dimensions,
            }),
            EmbedderKind::Ollama => Arc::new(OllamaEmbedder::connect(
                &ollama_url,
                embed_model,
                config.embedding_dimensions,
            )?),
        };

        let generator: Option<Arc<dyn Generator>> = match generate_model {
            Some(model) => match OllamaGenerator::connect(&ollama_url, model) {
                Ok(generator) => Some(Arc::new(generator)),
                Err(error) => {
                    warn!(%error, "generation model unavailable, answering extractively");
                    None
                }
            },
            None => None,
        };

        Ok(RagSession::new(embedder, generator, config)?)
    })
    .await??;

    Ok(SharedSession::new(session))
}

fn print_answer(result: &QueryAnswer) {
    println!("{}", result.answer);
    if !result.sources.is_empty() {
        println!("sources:");
        for (position, source) in result.sources.iter().enumerate() {
            println!("  [{}] {source}", position + 1);
        }
    }
}
