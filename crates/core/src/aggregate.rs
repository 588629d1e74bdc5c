use crate::models::{ChunkFailure, ChunkResult, ExtractedAnswer};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MergePolicy {
    /// Every chunk's answer, space-joined in chunk order.
    ConcatenateAll,
    /// The single highest-confidence answer.
    BestSingleMatch,
}

#[derive(Debug)]
pub struct ChunkOutcome {
    pub chunk_index: usize,
    pub result: ChunkResult,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MergedAnswer {
    pub answer: String,
    pub confidence: f32,
    pub chunk_indices: Vec<usize>,
    pub failures: Vec<ChunkFailure>,
}

pub fn merge(policy: MergePolicy, outcomes: Vec<ChunkOutcome>) -> MergedAnswer {
    let mut failures = Vec::new();
    let mut answered = Vec::new();

    for outcome in outcomes {
        match outcome.result {
            Ok(extracted) => answered.push((outcome.chunk_index, extracted)),
            Err(error) => failures.push(ChunkFailure {
                chunk_index: outcome.chunk_index,
                reason: error.to_string(),
            }),
        }
    }

    let mut merged = match policy {
        MergePolicy::ConcatenateAll => {
            let confidence = if answered.is_empty() {
                0.0
            } else {
                answered.iter().map(|(_, extracted)| extracted.confidence).sum::<f32>()
                    / answered.len() as f32
            };

            let mut chunk_indices = Vec::new();
            let mut parts = Vec::new();
            for (chunk_index, extracted) in &answered {
                let part = extracted.answer.trim();
                if !part.is_empty() {
                    chunk_indices.push(*chunk_index);
                    parts.push(part);
                }
            }

            MergedAnswer {
                answer: parts.join(" "),
                confidence,
                chunk_indices,
                failures: Vec::new(),
            }
        }
        MergePolicy::BestSingleMatch => answered
            .into_iter()
            .filter(|(_, extracted)| !extracted.answer.trim().is_empty())
            .fold(None::<(usize, ExtractedAnswer)>, |best, candidate| match best {
                Some(current) if current.1.confidence >= candidate.1.confidence => Some(current),
                _ => Some(candidate),
            })
            .map(|(chunk_index, extracted)| MergedAnswer {
                answer: extracted.answer.trim().to_string(),
                confidence: extracted.confidence,
                chunk_indices: vec![chunk_index],
                failures: Vec::new(),
            })
            .unwrap_or_default(),
    };

    merged.failures = failures;
    merged
}
