//! Core data types used throughout the assistant.
//!
//! These represent the guideline chunks flowing through the indexing
//! pipeline and the per-interaction request/result values.

use serde::{Deserialize, Serialize};

/// A chunk of the guideline document's text.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub chunk_index: i64,
    pub text: String,
    pub hash: String,
}

/// A retrieved chunk with its similarity to the query.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk_index: i64,
    pub text: String,
    pub score: f64,
}

/// User-submitted pair of HTML and a natural-language instruction.
/// Held only for the duration of one interaction.
#[derive(Debug, Clone, Deserialize)]
pub struct EditRequest {
    pub instruction: String,
    pub code: String,
}

/// The revised HTML and a short explanation of the change.
#[derive(Debug, Clone, Serialize)]
pub struct EditResult {
    pub revised_code: String,
    pub explanation: String,
}

/// Where an interaction is in its lifecycle. Each interaction starts at
/// `Idle` and moves forward only; `Failed` is terminal and records the
/// phase that was active when the error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    AwaitingRetrieval,
    AwaitingRevision,
    AwaitingExplanation,
    Done,
    Failed,
}

/// Explicit per-interaction state returned by the orchestrator and rendered
/// by the UI layer. Nothing here outlives the interaction.
#[derive(Debug, Clone, Serialize)]
pub struct InteractionState {
    pub phase: Phase,
    pub original_code: String,
    pub revised_code: Option<String>,
    pub explanation: Option<String>,
    pub context: Option<String>,
    pub error: Option<String>,
    /// Machine-readable class of `error` (see [`crate::error::AssistError::code`]).
    pub error_code: Option<String>,
}

impl InteractionState {
    pub fn new(original_code: &str) -> Self {
        Self {
            phase: Phase::Idle,
            original_code: original_code.to_string(),
            revised_code: None,
            explanation: None,
            context: None,
            error: None,
            error_code: None,
        }
    }

    /// The finished result pair, present only once the interaction is done.
    pub fn result(&self) -> Option<EditResult> {
        match (&self.revised_code, &self.explanation) {
            (Some(revised_code), Some(explanation)) if self.phase == Phase::Done => {
                Some(EditResult {
                    revised_code: revised_code.clone(),
                    explanation: explanation.clone(),
                })
            }
            _ => None,
        }
    }
}
