//! Deterministic embedders and extractors for pipeline tests.

use crate::embeddings::Embedder;
use crate::traits::AnswerExtractor;
use crate::{ExtractedAnswer, QaError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// One axis per vocabulary word; a component is 1.0 when the word occurs.
pub struct VocabularyEmbedder {
    pub vocabulary: Vec<&'static str>,
}

impl VocabularyEmbedder {
    pub fn new(vocabulary: &[&'static str]) -> Self {
        Self {
            vocabulary: vocabulary.to_vec(),
        }
    }
}

impl Embedder for VocabularyEmbedder {
    fn dimensions(&self) -> usize {
        self.vocabulary.len()
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let words = text
            .split(|c: char| !c.is_alphanumeric())
            .map(str::to_lowercase)
            .collect::<Vec<_>>();

        self.vocabulary
            .iter()
            .map(|term| {
                if words.iter().any(|word| word == term) {
                    1.0
                } else {
                    0.0
                }
            })
            .collect()
    }
}

/// Sleeps before every embedding, long enough to outlast a short test timeout.
pub struct DelayedEmbedder {
    pub inner: VocabularyEmbedder,
    pub delay: Duration,
}

impl Embedder for DelayedEmbedder {
    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        std::thread::sleep(self.delay);
        self.inner.embed(text)
    }
}

type Script = Box<dyn Fn(&str, &str) -> Result<ExtractedAnswer, QaError> + Send + Sync>;

/// Answers through a closure and counts every call.
pub struct ScriptedExtractor {
    script: Script,
    slow_marker: Option<&'static str>,
    calls: AtomicUsize,
}

impl ScriptedExtractor {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(&str, &str) -> Result<ExtractedAnswer, QaError> + Send + Sync + 'static,
    {
        Self {
            script: Box::new(script),
            slow_marker: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Contexts containing `marker` stall long enough to hit any test timeout.
    pub fn stalling_on(mut self, marker: &'static str) -> Self {
        self.slow_marker = Some(marker);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnswerExtractor for ScriptedExtractor {
    async fn extract(
        &self,
        question: &str,
        context: &str,
        _max_answer_length: usize,
    ) -> Result<ExtractedAnswer, QaError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self
            .slow_marker
            .is_some_and(|marker| context.contains(marker))
        {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        (self.script)(question, context)
    }
}

pub fn answer(text: &str, confidence: f32) -> Result<ExtractedAnswer, QaError> {
    Ok(ExtractedAnswer {
        answer: text.to_string(),
        confidence,
    })
}
