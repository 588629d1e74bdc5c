use crate::traits::AnswerExtractor;
use crate::{ExtractedAnswer, QaError};
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use url::Url;

pub const DEFAULT_MAX_ANSWER_LENGTH: usize = 200;

#[derive(Debug, Clone, Serialize)]
struct QaInputs<'a> {
    question: &'a str,
    context: &'a str,
}

#[derive(Debug, Clone, Serialize)]
struct QaParameters {
    max_answer_len: usize,
}

#[derive(Debug, Clone, Serialize)]
struct QaRequest<'a> {
    inputs: QaInputs<'a>,
    parameters: QaParameters,
}

#[derive(Debug, Clone, Deserialize)]
struct QaSpan {
    answer: String,
    #[serde(default)]
    score: f32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum QaResponse {
    Single(QaSpan),
    Ranked(Vec<QaSpan>),
}

/// Calls an extractive question-answering inference endpoint that accepts the
/// Hugging Face `{inputs: {question, context}}` payload.
pub struct HttpAnswerExtractor {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
}

impl HttpAnswerExtractor {
    pub fn new(endpoint: &str, api_key: Option<String>) -> Result<Self, QaError> {
        Ok(Self {
            client: Client::new(),
            endpoint: Url::parse(endpoint.trim())?,
            api_key: api_key
                .map(|key| key.trim().to_string())
                .filter(|key| !key.is_empty()),
        })
    }
}

#[async_trait]
impl AnswerExtractor for HttpAnswerExtractor {
    async fn extract(
        &self,
        question: &str,
        context: &str,
        max_answer_length: usize,
    ) -> Result<ExtractedAnswer, QaError> {
        let payload = QaRequest {
            inputs: QaInputs { question, context },
            parameters: QaParameters {
                max_answer_len: max_answer_length,
            },
        };

        let mut request = self.client.post(self.endpoint.clone()).json(&payload);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(QaError::BackendResponse {
                backend: self.endpoint.to_string(),
                details: response.status().to_string(),
            });
        }

        let body = response.text().await?;
        span_from_response(serde_json::from_str(&body)?)
    }
}

fn span_from_response(response: QaResponse) -> Result<ExtractedAnswer, QaError> {
    let span = match response {
        QaResponse::Single(span) => span,
        QaResponse::Ranked(spans) => spans
            .into_iter()
            .next()
            .ok_or_else(|| QaError::Extraction("endpoint returned no spans".to_string()))?,
    };

    Ok(ExtractedAnswer {
        answer: span.answer.trim().to_string(),
        confidence: span.score,
    })
}

const STOPWORDS: [&str; 24] = [
    "a", "an", "and", "are", "as", "at", "be", "by", "did", "do", "does", "for", "how", "in",
    "is", "it", "of", "on", "the", "to", "was", "what", "when", "who",
];

/// Offline extractor: answers with the context sentence sharing the most
/// content words with the question.
pub struct SentenceOverlapExtractor {
    sentence_re: Regex,
    token_re: Regex,
}

impl SentenceOverlapExtractor {
    pub fn new() -> Result<Self, QaError> {
        Ok(Self {
            sentence_re: Regex::new(r"[^.!?]+[.!?]*")?,
            token_re: Regex::new(r"[\p{L}\p{N}']+")?,
        })
    }

    fn content_terms(&self, text: &str) -> HashSet<String> {
        self.token_re
            .find_iter(text)
            .map(|token| token.as_str().to_lowercase())
            .filter(|token| !STOPWORDS.contains(&token.as_str()))
            .collect()
    }

    fn best_sentence<'a>(&self, question: &str, context: &'a str) -> Option<(&'a str, f32)> {
        let question_terms = self.content_terms(question);
        if question_terms.is_empty() {
            return None;
        }

        let mut best: Option<(&'a str, usize)> = None;
        for sentence in self.sentence_re.find_iter(context) {
            let sentence = sentence.as_str().trim();
            if sentence.is_empty() {
                continue;
            }
            let overlap = self
                .content_terms(sentence)
                .intersection(&question_terms)
                .count();
            if overlap > best.map_or(0, |(_, score)| score) {
                best = Some((sentence, overlap));
            }
        }

        best.map(|(sentence, overlap)| (sentence, overlap as f32 / question_terms.len() as f32))
    }
}

#[async_trait]
impl AnswerExtractor for SentenceOverlapExtractor {
    async fn extract(
        &self,
        question: &str,
        context: &str,
        max_answer_length: usize,
    ) -> Result<ExtractedAnswer, QaError> {
        Ok(match self.best_sentence(question, context) {
            Some((sentence, confidence)) => ExtractedAnswer {
                answer: sentence
                    .split_whitespace()
                    .take(max_answer_length)
                    .collect::<Vec<_>>()
                    .join(" "),
                confidence,
            },
            None => ExtractedAnswer {
                answer: String::new(),
                confidence: 0.0,
            },
        })
    }
}
