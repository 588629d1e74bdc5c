use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use docqa_core::{
    load_corpus_best_effort, load_document, AnswerExtractor, CharacterNgramEmbedder,
    CorpusOutcome, Embedder, FileTextExtractor, HttpAnswerExtractor, QaConfig, QaPipeline,
    QuestionBatch, SentenceOverlapExtractor, SharedCorpus,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "docqa", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    settings: Settings,
}

#[derive(Args)]
struct Settings {
    /// TOML file with pipeline settings.
    #[arg(long, env = "DOCQA_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Maximum words per chunk.
    #[arg(long, global = true)]
    chunk_size: Option<usize>,

    /// Squared L2 distance a corpus match must stay below.
    #[arg(long, global = true)]
    relevance_threshold: Option<f32>,

    /// Maximum answer length passed to the extractor.
    #[arg(long, global = true)]
    max_answer_length: Option<usize>,

    /// Number of nearest chunks to retrieve in corpus search.
    #[arg(long, global = true)]
    top_k: Option<usize>,

    /// Extractive QA inference endpoint. Without it answers come from the
    /// offline sentence-overlap extractor.
    #[arg(long, env = "DOCQA_QA_ENDPOINT", global = true)]
    qa_endpoint: Option<String>,

    /// Bearer token for the QA endpoint.
    #[arg(long, env = "DOCQA_QA_TOKEN", global = true, hide_env_values = true)]
    qa_token: Option<String>,
}

impl Settings {
    fn resolve(&self) -> anyhow::Result<QaConfig> {
        let mut config = QaConfig::load(self.config.as_deref())?;
        if let Some(chunk_size) = self.chunk_size {
            config.chunk_size = chunk_size;
        }
        if let Some(threshold) = self.relevance_threshold {
            config.relevance_threshold = threshold;
        }
        if let Some(max_answer_length) = self.max_answer_length {
            config.max_answer_length = max_answer_length;
        }
        if let Some(top_k) = self.top_k {
            config.top_k = top_k;
        }
        config.validate()?;
        Ok(config)
    }

    fn extractor(&self) -> anyhow::Result<Arc<dyn AnswerExtractor>> {
        let extractor: Arc<dyn AnswerExtractor> = match &self.qa_endpoint {
            Some(endpoint) => Arc::new(HttpAnswerExtractor::new(endpoint, self.qa_token.clone())?),
            None => Arc::new(SentenceOverlapExtractor::new()?),
        };
        Ok(extractor)
    }
}

#[derive(Subcommand)]
enum Command {
    /// Answer a list of questions from one document.
    Ask {
        /// PDF, text, or markdown file.
        #[arg(long)]
        document: PathBuf,
        /// Newline-separated questions. Without this or `--questions-file`
        /// the batch is empty and nothing is answered.
        #[arg(long, conflicts_with = "questions_file")]
        questions: Option<String>,
        /// File with one question per line.
        #[arg(long)]
        questions_file: Option<PathBuf>,
    },
    /// Find the most relevant document in a folder and answer from it.
    Search {
        /// Folder scanned recursively for documents.
        #[arg(long)]
        folder: PathBuf,
        /// Question to answer. Repeat for several independent queries.
        #[arg(long, required = true)]
        query: Vec<String>,
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
    let config = cli.settings.resolve()?;
    let embedder: Arc<dyn Embedder> =
        Arc::new(CharacterNgramEmbedder::new(config.embedding_dimensions));
    let pipeline = Arc::new(QaPipeline::new(
        config.clone(),
        embedder,
        cli.settings.extractor()?,
    )?);

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        chunk_size = config.chunk_size,
        relevance_threshold = config.relevance_threshold,
        "docqa boot"
    );

    match cli.command {
        Command::Ask {
            document,
            questions,
            questions_file,
        } => ask(&pipeline, &document, questions, questions_file).await,
        Command::Search { folder, query } => search(pipeline, &folder, query).await,
    }
}

async fn ask(
    pipeline: &QaPipeline,
    path: &Path,
    questions: Option<String>,
    questions_file: Option<PathBuf>,
) -> anyhow::Result<()> {
    let batch = read_questions(questions, questions_file.as_deref()).await?;

    let document = load_document(
        path,
        pipeline.config().chunk_size,
        &FileTextExtractor::default(),
    )?;
    info!(
        document = %document.title,
        chunks = document.chunks.len(),
        questions = batch.len(),
        "answering questions"
    );

    let result = pipeline.answer_document(&document, &batch).await?;

    for (position, record) in result.records.iter().enumerate() {
        println!("Q{}: {}", position + 1, record.question);
        if record.answer.is_empty() {
            println!("A{}: (no answer found)", position + 1);
        } else {
            println!("A{}: {}", position + 1, record.answer);
        }
    }

    if let Some(message) = result.error_message() {
        warn!(failures = result.failure_count(), "partial results");
        println!("error: {message}");
    }

    Ok(())
}

async fn read_questions(
    questions: Option<String>,
    questions_file: Option<&Path>,
) -> anyhow::Result<QuestionBatch> {
    let raw_questions = match (questions, questions_file) {
        (Some(text), _) => text,
        (None, Some(file)) => tokio::fs::read_to_string(file).await?,
        (None, None) => String::new(),
    };
    Ok(QuestionBatch::from_lines(&raw_questions))
}

async fn search(
    pipeline: Arc<QaPipeline>,
    folder: &Path,
    queries: Vec<String>,
) -> anyhow::Result<()> {
    let report = load_corpus_best_effort(
        folder,
        pipeline.config().chunk_size,
        &FileTextExtractor::default(),
    )?;

    for skipped in &report.skipped_files {
        warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped document");
    }
    if report.documents.is_empty() {
        println!("0 documents indexed (all files were skipped)");
        return Ok(());
    }

    let corpus = Arc::new(SharedCorpus::default());
    let snapshot = corpus
        .rebuild(report.documents, pipeline.embedder())
        .await?;
    info!(
        folder = %folder.display(),
        documents = snapshot.documents().len(),
        built_at = %snapshot.built_at().to_rfc3339(),
        "corpus ready"
    );

    let tasks = queries
        .into_iter()
        .map(|query| {
            let pipeline = Arc::clone(&pipeline);
            let corpus = Arc::clone(&corpus);
            tokio::spawn(async move {
                let outcome = pipeline.search_shared(&corpus, &query).await;
                (query, outcome)
            })
        })
        .collect::<Vec<_>>();

    for task in tasks {
        let (query, outcome) = task.await?;
        println!("query: {query}");
        match outcome {
            Ok(CorpusOutcome::Answered(found)) => {
                println!(
                    "  answer: {}",
                    if found.answer.is_empty() {
                        "(no answer found)"
                    } else {
                        found.answer.as_str()
                    }
                );
                println!(
                    "  source: {} (chunk {}, distance={:.4}, confidence={:.3})",
                    found.document_title, found.chunk_index, found.distance, found.confidence
                );
            }
            Ok(CorpusOutcome::Rejected {
                best_distance,
                threshold,
            }) => {
                println!(
                    "  not relevant: closest distance {best_distance:.4} \
                     is not below {threshold:.4}"
                );
            }
            Err(error) if error.is_recoverable() => {
                warn!(query = %query, error = %error, "query failed");
                println!("  error: {error}");
            }
            Err(error) => return Err(error.into()),
        }
    }

    Ok(())
}
