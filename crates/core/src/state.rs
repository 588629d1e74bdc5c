use crate::error::QaError;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PipelineState {
    Idle,
    Embedding,
    Searching,
    Gating,
    Extracting,
    Aggregating,
    Rejected,
    Done,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Rejected)
    }

    fn can_move_to(self, next: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Idle, Extracting)
                | (Idle, Embedding)
                | (Idle, Done)
                | (Embedding, Searching)
                | (Searching, Gating)
                | (Gating, Rejected)
                | (Gating, Extracting)
                | (Extracting, Aggregating)
                | (Extracting, Done)
                | (Aggregating, Done)
        )
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Tracks one request through the pipeline. A request is only ever in one
/// state and moves forward along the allowed edges.
#[derive(Debug, Clone)]
pub struct RequestLifecycle {
    current: PipelineState,
    trail: Vec<PipelineState>,
}

impl Default for RequestLifecycle {
    fn default() -> Self {
        Self {
            current: PipelineState::Idle,
            trail: vec![PipelineState::Idle],
        }
    }
}

impl RequestLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> PipelineState {
        self.current
    }

    pub fn trail(&self) -> &[PipelineState] {
        &self.trail
    }

    pub fn advance(&mut self, next: PipelineState) -> Result<PipelineState, QaError> {
        if !self.current.can_move_to(next) {
            return Err(QaError::InvalidTransition {
                from: self.current.to_string(),
                to: next.to_string(),
            });
        }

        debug!(from = %self.current, to = %next, "pipeline transition");
        self.current = next;
        self.trail.push(next);
        Ok(next)
    }
}
