pub mod aggregate;
pub mod answer;
pub mod chunking;
pub mod config;
pub mod corpus;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod gate;
pub mod index;
pub mod ingest;
pub mod models;
pub mod orchestrator;
pub mod state;
pub mod traits;

#[cfg(test)]
mod testing;

pub use aggregate::{merge, ChunkOutcome, MergePolicy, MergedAnswer};
pub use answer::{HttpAnswerExtractor, SentenceOverlapExtractor, DEFAULT_MAX_ANSWER_LENGTH};
pub use chunking::{build_chunks, build_document, chunk_words, WordChunks, DEFAULT_CHUNK_SIZE};
pub use config::QaConfig;
pub use corpus::{CorpusIndex, SharedCorpus};
pub use embeddings::{CharacterNgramEmbedder, Embedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{IngestError, QaError};
pub use extractor::{FileTextExtractor, LopdfExtractor, PlainTextExtractor};
pub use gate::{accept, RelevanceGate, DEFAULT_RELEVANCE_THRESHOLD};
pub use index::{squared_l2, FlatL2Index};
pub use ingest::{
    discover_documents, load_corpus_best_effort, load_document, IngestionReport,
    SkippedDocument,
};
pub use models::{
    AnswerRecord, AnswerSource, BatchAnswers, Chunk, ChunkFailure, ChunkRef, ChunkResult,
    CorpusAnswer, CorpusOutcome, Document, ExtractedAnswer, Neighbor, QuestionBatch,
};
pub use orchestrator::QaPipeline;
pub use state::{PipelineState, RequestLifecycle};
pub use traits::{AnswerExtractor, TextExtractor, VectorIndex};
