use serde::{Deserialize, Serialize};

pub const DEFAULT_RELEVANCE_THRESHOLD: f32 = 0.8;

/// A query is in-domain only when its closest candidate is strictly nearer
/// than the threshold.
pub fn accept(best_distance: f32, threshold: f32) -> bool {
    best_distance < threshold
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RelevanceGate {
    pub threshold: f32,
}

impl RelevanceGate {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn accept(&self, best_distance: f32) -> bool {
        accept(best_distance, self.threshold)
    }
}

impl Default for RelevanceGate {
    fn default() -> Self {
        Self::new(DEFAULT_RELEVANCE_THRESHOLD)
    }
}
