use crate::aggregate::{merge, ChunkOutcome, MergePolicy};
use crate::chunking::build_document;
use crate::config::QaConfig;
use crate::corpus::{CorpusIndex, SharedCorpus};
use crate::embeddings::Embedder;
use crate::gate::RelevanceGate;
use crate::state::{PipelineState, RequestLifecycle};
use crate::traits::{AnswerExtractor, VectorIndex};
use crate::{
    AnswerRecord, AnswerSource, BatchAnswers, ChunkResult, CorpusAnswer, CorpusOutcome, Document,
    QaError, QuestionBatch,
};
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{error, info_span, warn, Instrument};
use uuid::Uuid;

/// Runs both request pipelines. Holds no per-request state, so one instance
/// can serve concurrent requests.
pub struct QaPipeline {
    config: QaConfig,
    gate: RelevanceGate,
    embedder: Arc<dyn Embedder>,
    extractor: Arc<dyn AnswerExtractor>,
}

impl QaPipeline {
    pub fn new(
        config: QaConfig,
        embedder: Arc<dyn Embedder>,
        extractor: Arc<dyn AnswerExtractor>,
    ) -> Result<Self, QaError> {
        config.validate()?;
        Ok(Self {
            gate: RelevanceGate::new(config.relevance_threshold),
            config,
            embedder,
            extractor,
        })
    }

    pub fn config(&self) -> &QaConfig {
        &self.config
    }

    pub fn embedder(&self) -> Arc<dyn Embedder> {
        Arc::clone(&self.embedder)
    }

    /// Chunks `text` with the configured chunk size, then answers `batch`
    /// against it.
    pub async fn answer_text(
        &self,
        title: &str,
        text: &str,
        batch: &QuestionBatch,
    ) -> Result<BatchAnswers, QaError> {
        let document = build_document(title, None, text, self.config.chunk_size)?;
        self.answer_document(&document, batch).await
    }

    /// Single-document mode: every question runs against every chunk and the
    /// per-chunk answers are concatenated in chunk order.
    pub async fn answer_document(
        &self,
        document: &Document,
        batch: &QuestionBatch,
    ) -> Result<BatchAnswers, QaError> {
        let span = info_span!(
            "answer_document",
            request_id = %Uuid::new_v4(),
            document = %document.title,
            chunks = document.chunks.len(),
            questions = batch.len()
        );
        self.run_document(document, batch).instrument(span).await
    }

    async fn run_document(
        &self,
        document: &Document,
        batch: &QuestionBatch,
    ) -> Result<BatchAnswers, QaError> {
        let mut lifecycle = RequestLifecycle::new();

        if batch.is_empty() {
            lifecycle.advance(PipelineState::Done)?;
            return Ok(BatchAnswers {
                records: Vec::new(),
                state: lifecycle.current(),
            });
        }

        lifecycle.advance(PipelineState::Extracting)?;
        let mut per_question = Vec::with_capacity(batch.len());
        for question in batch.questions() {
            let mut outcomes = Vec::with_capacity(document.chunks.len());
            for chunk in &document.chunks {
                let result = self.extract_bounded(question, &chunk.text).await;
                if let Err(failure) = &result {
                    warn!(
                        question = %question,
                        chunk_index = chunk.chunk_index,
                        error = %failure,
                        "chunk extraction failed, continuing"
                    );
                }
                outcomes.push(ChunkOutcome {
                    chunk_index: chunk.chunk_index,
                    result,
                });
            }
            per_question.push((question, outcomes));
        }

        lifecycle.advance(PipelineState::Aggregating)?;
        let records = per_question
            .into_iter()
            .map(|(question, outcomes)| {
                let merged = merge(MergePolicy::ConcatenateAll, outcomes);
                AnswerRecord {
                    question: question.clone(),
                    answer: merged.answer,
                    confidence: merged.confidence,
                    source: AnswerSource {
                        document_title: document.title.clone(),
                        chunk_indices: merged.chunk_indices,
                    },
                    failures: merged.failures,
                }
            })
            .collect();

        lifecycle.advance(PipelineState::Done)?;
        Ok(BatchAnswers {
            records,
            state: lifecycle.current(),
        })
    }

    /// Corpus-search mode against the current snapshot of `corpus`.
    pub async fn search_shared(
        &self,
        corpus: &SharedCorpus,
        question: &str,
    ) -> Result<CorpusOutcome, QaError> {
        let snapshot = corpus.snapshot();
        self.search_corpus(&snapshot, question).await
    }

    /// Corpus-search mode: finds the closest chunk, gates on its distance and
    /// extracts the best single answer from the winning document's retrieved
    /// chunks. A rejected query never reaches the extractor.
    pub async fn search_corpus(
        &self,
        corpus: &CorpusIndex,
        question: &str,
    ) -> Result<CorpusOutcome, QaError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(QaError::InvalidInput("question is empty".to_string()));
        }

        let span = info_span!(
            "search_corpus",
            request_id = %Uuid::new_v4(),
            question = %question,
            top_k = self.config.top_k
        );
        self.run_search(corpus, question).instrument(span).await
    }

    async fn run_search(
        &self,
        corpus: &CorpusIndex,
        question: &str,
    ) -> Result<CorpusOutcome, QaError> {
        let mut lifecycle = RequestLifecycle::new();

        lifecycle.advance(PipelineState::Embedding)?;
        let query_vector = self.embed_bounded(question).await?;

        lifecycle.advance(PipelineState::Searching)?;
        let hits = corpus
            .index()
            .search(&query_vector, self.config.top_k)
            .map_err(|failure| {
                error!(error = %failure, "corpus search failed");
                failure
            })?;
        let best = *hits.first().ok_or(QaError::EmptyIndex)?;

        lifecycle.advance(PipelineState::Gating)?;
        if !self.gate.accept(best.distance) {
            lifecycle.advance(PipelineState::Rejected)?;
            return Ok(CorpusOutcome::Rejected {
                best_distance: best.distance,
                threshold: self.gate.threshold,
            });
        }

        lifecycle.advance(PipelineState::Extracting)?;
        let candidates = hits
            .iter()
            .filter(|hit| hit.key.document == best.key.document)
            .filter_map(|hit| corpus.resolve(hit.key).map(|(_, chunk)| (hit, chunk)))
            .collect::<Vec<_>>();
        let document_title = corpus
            .resolve(best.key)
            .map(|(document, _)| document.title.clone())
            .ok_or(QaError::EmptyIndex)?;

        let mut outcomes = Vec::with_capacity(candidates.len());
        for (hit, chunk) in &candidates {
            let result = self.extract_bounded(question, &chunk.text).await;
            if let Err(failure) = &result {
                warn!(
                    chunk_index = chunk.chunk_index,
                    distance = hit.distance,
                    error = %failure,
                    "candidate extraction failed, continuing"
                );
            }
            outcomes.push(ChunkOutcome {
                chunk_index: chunk.chunk_index,
                result,
            });
        }

        let merged = merge(MergePolicy::BestSingleMatch, outcomes);
        if merged.chunk_indices.is_empty() && !merged.failures.is_empty() {
            let reasons = merged
                .failures
                .iter()
                .map(|failure| format!("chunk {}: {}", failure.chunk_index, failure.reason))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(QaError::Extraction(reasons));
        }

        let chunk_index = merged
            .chunk_indices
            .first()
            .copied()
            .unwrap_or(best.key.chunk);
        let distance = candidates
            .iter()
            .find(|(_, chunk)| chunk.chunk_index == chunk_index)
            .map_or(best.distance, |(hit, _)| hit.distance);

        lifecycle.advance(PipelineState::Done)?;
        Ok(CorpusOutcome::Answered(CorpusAnswer {
            question: question.to_string(),
            answer: merged.answer,
            confidence: merged.confidence,
            document_title,
            chunk_index,
            distance,
        }))
    }

    async fn embed_bounded(&self, text: &str) -> Result<Vec<f32>, QaError> {
        let embedder = Arc::clone(&self.embedder);
        let owned = text.to_string();
        let task = tokio::task::spawn_blocking(move || embedder.embed(&owned));

        match timeout(self.config.embed_timeout(), task).await {
            Ok(Ok(vector)) => Ok(vector),
            Ok(Err(join_error)) => Err(QaError::Task(join_error.to_string())),
            Err(_) => Err(QaError::Timeout {
                operation: "embed",
                after_ms: self.config.embed_timeout_ms,
            }),
        }
    }

    async fn extract_bounded(&self, question: &str, context: &str) -> ChunkResult {
        let call = self
            .extractor
            .extract(question, context, self.config.max_answer_length);

        match timeout(self.config.extract_timeout(), call).await {
            Ok(result) => result,
            Err(_) => Err(QaError::Timeout {
                operation: "extract",
                after_ms: self.config.extract_timeout_ms,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{answer, DelayedEmbedder, ScriptedExtractor, VocabularyEmbedder};
    use std::time::Duration;
    use crate::CharacterNgramEmbedder;

    const FRANCE: &str =
        "Paris is the capital of France. It has a population of over two million.";

    const VOCABULARY: [&str; 4] = ["quantum", "entanglement", "bread", "flour"];

    fn pipeline(
        config: QaConfig,
        extractor: Arc<ScriptedExtractor>,
    ) -> Result<QaPipeline, QaError> {
        QaPipeline::new(
            config,
            Arc::new(VocabularyEmbedder::new(&VOCABULARY)),
            extractor,
        )
    }

    fn two_document_corpus(embedder: &dyn Embedder) -> Result<CorpusIndex, QaError> {
        CorpusIndex::build(
            vec![
                build_document(
                    "baking.txt",
                    None,
                    "Good bread needs flour, water, salt and patience.",
                    500,
                )?,
                build_document(
                    "physics.txt",
                    None,
                    "Quantum entanglement is a correlation between particles \
                     that persists at any distance.",
                    500,
                )?,
            ],
            embedder,
        )
    }

    #[tokio::test]
    async fn short_document_answers_from_its_single_chunk() -> Result<(), QaError> {
        let extractor = Arc::new(ScriptedExtractor::new(|question, context| {
            if question.contains("capital") && context.contains("capital of France") {
                answer("Paris", 0.98)
            } else {
                answer("", 0.0)
            }
        }));
        let qa = pipeline(QaConfig::default(), Arc::clone(&extractor))?;

        let batch = QuestionBatch::from_lines("What is the capital of France?");
        let result = qa.answer_text("france.pdf", FRANCE, &batch).await?;

        assert_eq!(result.state, PipelineState::Done);
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].answer, "Paris");
        assert_eq!(result.records[0].source.chunk_indices, vec![0]);
        assert_eq!(result.error_message(), None);
        assert_eq!(extractor.calls(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn answers_keep_question_order_and_concatenate_chunks() -> Result<(), QaError> {
        let extractor = Arc::new(ScriptedExtractor::new(|question, context| {
            let first_word = context.split(' ').next().unwrap_or_default();
            answer(&format!("{}-{first_word}", &question[..1]), 0.5)
        }));
        let qa = pipeline(
            QaConfig {
                chunk_size: 2,
                ..QaConfig::default()
            },
            Arc::clone(&extractor),
        )?;

        let batch = QuestionBatch::new(vec!["zeta?".to_string(), "alpha?".to_string()]);
        let result = qa.answer_text("doc", "one two three four five", &batch).await?;

        assert_eq!(result.records[0].question, "zeta?");
        assert_eq!(result.records[0].answer, "z-one z-three z-five");
        assert_eq!(result.records[1].question, "alpha?");
        assert_eq!(result.records[1].answer, "a-one a-three a-five");
        assert_eq!(extractor.calls(), 6);
        Ok(())
    }

    #[tokio::test]
    async fn failed_chunk_is_skipped_and_reported() -> Result<(), QaError> {
        let extractor = Arc::new(ScriptedExtractor::new(|_, context| {
            if context.contains("broken") {
                Err(QaError::Extraction("scoring failed".to_string()))
            } else {
                answer(context.split(' ').next().unwrap_or_default(), 0.4)
            }
        }));
        let qa = pipeline(
            QaConfig {
                chunk_size: 2,
                ..QaConfig::default()
            },
            Arc::clone(&extractor),
        )?;

        let batch = QuestionBatch::from_lines("first?\nsecond?");
        let result = qa
            .answer_text("doc", "alpha beta broken chunk gamma delta", &batch)
            .await?;

        assert_eq!(result.state, PipelineState::Done);
        for record in &result.records {
            assert_eq!(record.answer, "alpha gamma");
            assert_eq!(record.source.chunk_indices, vec![0, 2]);
            assert_eq!(record.failures.len(), 1);
            assert_eq!(record.failures[0].chunk_index, 1);
        }
        assert_eq!(extractor.calls(), 6);
        let message = result.error_message().unwrap_or_default();
        assert!(message.contains("scoring failed"));
        Ok(())
    }

    #[tokio::test]
    async fn slow_chunk_times_out_without_sinking_the_batch() -> Result<(), QaError> {
        let extractor = Arc::new(
            ScriptedExtractor::new(|_, context| answer(context, 0.9)).stalling_on("stall"),
        );
        let qa = pipeline(
            QaConfig {
                chunk_size: 1,
                extract_timeout_ms: 20,
                ..QaConfig::default()
            },
            Arc::clone(&extractor),
        )?;

        let result = qa
            .answer_text("doc", "before stall after", &QuestionBatch::from_lines("q"))
            .await?;

        let record = &result.records[0];
        assert_eq!(record.answer, "before after");
        assert_eq!(record.failures.len(), 1);
        assert!(record.failures[0].reason.contains("timed out"));
        Ok(())
    }

    #[tokio::test]
    async fn empty_question_list_is_done_with_no_answers() -> Result<(), QaError> {
        let extractor = Arc::new(ScriptedExtractor::new(|_, _| answer("x", 1.0)));
        let qa = pipeline(QaConfig::default(), Arc::clone(&extractor))?;

        let result = qa
            .answer_text("france.pdf", FRANCE, &QuestionBatch::from_lines(""))
            .await?;

        assert_eq!(result.state, PipelineState::Done);
        assert!(result.records.is_empty());
        assert_eq!(result.error_message(), None);
        assert_eq!(extractor.calls(), 0);
        Ok(())
    }

    #[test]
    fn zero_chunk_size_fails_before_any_work() {
        let extractor = Arc::new(ScriptedExtractor::new(|_, _| answer("x", 1.0)));
        let result = pipeline(
            QaConfig {
                chunk_size: 0,
                ..QaConfig::default()
            },
            Arc::clone(&extractor),
        );

        assert!(matches!(result, Err(QaError::InvalidInput(_))));
        assert_eq!(extractor.calls(), 0);
    }

    #[tokio::test]
    async fn corpus_search_finds_the_matching_document() -> Result<(), QaError> {
        let extractor = Arc::new(ScriptedExtractor::new(|_, context| {
            answer(
                context
                    .split(" that ")
                    .next()
                    .unwrap_or_default(),
                0.87,
            )
        }));
        let qa = pipeline(QaConfig::default(), Arc::clone(&extractor))?;
        let corpus = two_document_corpus(qa.embedder().as_ref())?;

        let outcome = qa
            .search_corpus(&corpus, "What is quantum entanglement?")
            .await?;

        let found = outcome.answer().ok_or(QaError::EmptyIndex)?;
        assert!(!outcome.is_rejected());
        assert_eq!(found.document_title, "physics.txt");
        assert_eq!(
            found.answer,
            "Quantum entanglement is a correlation between particles"
        );
        assert!(found.distance.abs() < 1e-6);
        assert_eq!(extractor.calls(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn slow_query_embedding_times_out_before_extraction() -> Result<(), QaError> {
        let extractor = Arc::new(ScriptedExtractor::new(|_, _| answer("x", 1.0)));
        let embedder = DelayedEmbedder {
            inner: VocabularyEmbedder::new(&VOCABULARY),
            delay: Duration::from_millis(500),
        };
        let corpus = two_document_corpus(&embedder.inner)?;
        let qa = QaPipeline::new(
            QaConfig {
                embed_timeout_ms: 20,
                ..QaConfig::default()
            },
            Arc::new(embedder),
            Arc::clone(&extractor) as Arc<dyn AnswerExtractor>,
        )?;

        let result = qa
            .search_corpus(&corpus, "What is quantum entanglement?")
            .await;

        let error = result.err().ok_or(QaError::EmptyIndex)?;
        assert!(matches!(
            error,
            QaError::Timeout {
                operation: "embed",
                ..
            }
        ));
        assert!(error.is_recoverable());
        assert_eq!(extractor.calls(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn unrelated_question_is_rejected_without_extraction() -> Result<(), QaError> {
        let extractor = Arc::new(ScriptedExtractor::new(|_, _| answer("made up", 0.99)));
        let qa = pipeline(QaConfig::default(), Arc::clone(&extractor))?;
        let corpus = two_document_corpus(qa.embedder().as_ref())?;

        let outcome = qa.search_corpus(&corpus, "How do volcanoes erupt?").await?;

        match outcome {
            CorpusOutcome::Rejected {
                best_distance,
                threshold,
            } => {
                assert!(best_distance >= threshold);
                assert_eq!(best_distance, 2.0);
            }
            CorpusOutcome::Answered(answer) => panic!("unexpected answer {answer:?}"),
        }
        assert_eq!(extractor.calls(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn best_match_prefers_the_most_confident_chunk_of_top_document() -> Result<(), QaError> {
        let extractor = Arc::new(ScriptedExtractor::new(|_, context| {
            if context.contains("particles") {
                answer("particles", 0.9)
            } else {
                answer("quantum", 0.3)
            }
        }));
        let qa = pipeline(
            QaConfig {
                top_k: 5,
                ..QaConfig::default()
            },
            Arc::clone(&extractor),
        )?;
        let corpus = CorpusIndex::build(
            vec![
                build_document("bread.txt", None, "bread flour bread flour", 2)?,
                build_document(
                    "physics.txt",
                    None,
                    "quantum entanglement quantum particles",
                    2,
                )?,
            ],
            qa.embedder().as_ref(),
        )?;

        let outcome = qa.search_corpus(&corpus, "quantum entanglement").await?;
        let found = outcome.answer().ok_or(QaError::EmptyIndex)?;

        assert_eq!(found.document_title, "physics.txt");
        assert_eq!(found.answer, "particles");
        assert_eq!(found.chunk_index, 1);
        assert!((found.distance - 1.0).abs() < 1e-6);
        assert_eq!(extractor.calls(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn all_candidates_failing_is_an_extraction_error() -> Result<(), QaError> {
        let extractor = Arc::new(ScriptedExtractor::new(|_, _| {
            Err(QaError::Extraction("model offline".to_string()))
        }));
        let qa = pipeline(QaConfig::default(), Arc::clone(&extractor))?;
        let corpus = two_document_corpus(qa.embedder().as_ref())?;

        let result = qa.search_corpus(&corpus, "quantum entanglement").await;
        match result {
            Err(failure) => {
                assert!(failure.is_recoverable());
                assert!(failure.to_string().contains("model offline"));
            }
            Ok(outcome) => panic!("unexpected outcome {outcome:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn empty_corpus_is_a_fatal_error() -> Result<(), QaError> {
        let extractor = Arc::new(ScriptedExtractor::new(|_, _| answer("x", 1.0)));
        let qa = pipeline(QaConfig::default(), Arc::clone(&extractor))?;

        let result = qa.search_corpus(&CorpusIndex::empty(), "quantum").await;
        assert!(matches!(result, Err(QaError::EmptyIndex)));
        assert_eq!(extractor.calls(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn query_dimension_must_match_the_corpus() -> Result<(), QaError> {
        let extractor = Arc::new(ScriptedExtractor::new(|_, _| answer("x", 1.0)));
        let qa = pipeline(QaConfig::default(), Arc::clone(&extractor))?;
        let corpus = two_document_corpus(&CharacterNgramEmbedder::new(16))?;

        let result = qa.search_corpus(&corpus, "quantum").await;
        assert!(matches!(
            result,
            Err(QaError::DimensionMismatch {
                expected: 16,
                found: 4
            })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn blank_question_is_invalid_input() -> Result<(), QaError> {
        let extractor = Arc::new(ScriptedExtractor::new(|_, _| answer("x", 1.0)));
        let qa = pipeline(QaConfig::default(), extractor)?;
        let corpus = two_document_corpus(qa.embedder().as_ref())?;

        assert!(matches!(
            qa.search_corpus(&corpus, "   ").await,
            Err(QaError::InvalidInput(_))
        ));
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_queries_share_one_snapshot() -> Result<(), QaError> {
        let extractor = Arc::new(ScriptedExtractor::new(|_, context| answer(context, 0.5)));
        let qa = Arc::new(pipeline(QaConfig::default(), Arc::clone(&extractor))?);
        let shared = Arc::new(SharedCorpus::default());
        shared
            .rebuild(
                vec![
                    build_document("baking.txt", None, "bread flour", 500)?,
                    build_document("physics.txt", None, "quantum entanglement", 500)?,
                ],
                qa.embedder(),
            )
            .await?;

        let tasks = ["bread and flour", "quantum entanglement", "volcano"]
            .into_iter()
            .map(|question| {
                let qa = Arc::clone(&qa);
                let shared = Arc::clone(&shared);
                tokio::spawn(async move { qa.search_shared(&shared, question).await })
            })
            .collect::<Vec<_>>();

        let mut outcomes = Vec::new();
        for task in tasks {
            outcomes.push(
                task.await
                    .map_err(|error| QaError::Task(error.to_string()))??,
            );
        }

        assert_eq!(
            outcomes[0].answer().map(|found| found.document_title.as_str()),
            Some("baking.txt")
        );
        assert_eq!(
            outcomes[1].answer().map(|found| found.document_title.as_str()),
            Some("physics.txt")
        );
        assert!(outcomes[2].is_rejected());
        assert_eq!(extractor.calls(), 2);
        Ok(())
    }
}
