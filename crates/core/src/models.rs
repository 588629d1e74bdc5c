use crate::error::QaError;
use crate::state::PipelineState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub document_id: String,
    pub title: String,
    pub source_path: Option<String>,
    pub checksum: String,
    pub ingested_at: DateTime<Utc>,
    pub text: String,
    pub chunks: Vec<Chunk>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub chunk_id: String,
    pub chunk_index: usize,
    pub text: String,
    pub word_count: usize,
    pub embedding: Option<Vec<f32>>,
}

/// Lookup key from an index entry back to the chunk it was built from.
/// Holds positions only; the corpus owns the documents.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ChunkRef {
    pub document: usize,
    pub chunk: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Neighbor<K> {
    pub key: K,
    /// Squared L2 distance. Lower is closer.
    pub distance: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractedAnswer {
    pub answer: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct QuestionBatch {
    questions: Vec<String>,
}

impl QuestionBatch {
    pub fn new(questions: Vec<String>) -> Self {
        Self { questions }
    }

    /// One question per line, trimmed. Blank lines are dropped.
    pub fn from_lines(text: &str) -> Self {
        Self {
            questions: text
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    pub fn questions(&self) -> &[String] {
        &self.questions
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerSource {
    pub document_title: String,
    pub chunk_indices: Vec<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkFailure {
    pub chunk_index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerRecord {
    pub question: String,
    pub answer: String,
    pub confidence: f32,
    pub source: AnswerSource,
    pub failures: Vec<ChunkFailure>,
}

impl AnswerRecord {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchAnswers {
    pub records: Vec<AnswerRecord>,
    pub state: PipelineState,
}

impl BatchAnswers {
    pub fn failure_count(&self) -> usize {
        self.records.iter().map(|record| record.failures.len()).sum()
    }

    pub fn error_message(&self) -> Option<String> {
        let failed = self.failure_count();
        if failed == 0 {
            return None;
        }

        let first = self
            .records
            .iter()
            .find_map(|record| {
                record
                    .failures
                    .first()
                    .map(|failure| (record.question.as_str(), failure))
            })
            .map(|(question, failure)| {
                format!(
                    "; first failure on \"{question}\" chunk {}: {}",
                    failure.chunk_index, failure.reason
                )
            })
            .unwrap_or_default();

        Some(format!(
            "{failed} chunk extraction(s) failed across {} question(s){first}",
            self.records.iter().filter(|record| record.is_partial()).count()
        ))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CorpusAnswer {
    pub question: String,
    pub answer: String,
    pub confidence: f32,
    pub document_title: String,
    pub chunk_index: usize,
    pub distance: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum CorpusOutcome {
    Answered(CorpusAnswer),
    Rejected { best_distance: f32, threshold: f32 },
}

impl CorpusOutcome {
    pub fn is_rejected(&self) -> bool {
        matches!(self, CorpusOutcome::Rejected { .. })
    }

    pub fn answer(&self) -> Option<&CorpusAnswer> {
        match self {
            CorpusOutcome::Answered(answer) => Some(answer),
            CorpusOutcome::Rejected { .. } => None,
        }
    }
}

/// Outcome of one extraction call over one chunk.
pub type ChunkResult = std::result::Result<ExtractedAnswer, QaError>;
