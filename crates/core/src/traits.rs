use crate::{ExtractedAnswer, IngestError, Neighbor, QaError};
use async_trait::async_trait;
use std::path::Path;

pub trait TextExtractor: Send + Sync {
    /// Plain text of the whole document, page and section boundaries elided.
    fn extract(&self, path: &Path) -> Result<String, IngestError>;
}

pub trait VectorIndex: Send + Sync {
    type Key: Copy + Send + Sync;

    fn dimensions(&self) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Up to `k` entries nearest to `query`, ascending by distance.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor<Self::Key>>, QaError>;
}

#[async_trait]
pub trait AnswerExtractor: Send + Sync {
    /// Extracts a span from `context` answering `question`. `context` is
    /// never longer than one chunk.
    async fn extract(
        &self,
        question: &str,
        context: &str,
        max_answer_length: usize,
    ) -> Result<ExtractedAnswer, QaError>;
}
