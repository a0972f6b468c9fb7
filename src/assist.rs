//! Assistant orchestrator.
//!
//! One interaction = one retrieval call followed by two sequential
//! generation calls (revise, then explain). Input is validated before any
//! network call. There is no retry and no partial-result recovery: the
//! first service failure ends the interaction, and the index is unaffected.
//!
//! The orchestrator is generic over [`Completion`] so tests can run the
//! full pipeline against a scripted backend.

use std::sync::Arc;

use crate::config::Config;
use crate::error::{AssistError, AssistResult};
use crate::generation::GenerationClient;
use crate::models::{EditRequest, InteractionState, Phase};
use crate::prompts;
use crate::store::RetrievalIndex;

/// The single-turn completion seam between the orchestrator and the
/// chat-completion service.
pub trait Completion: Send + Sync {
    fn complete(
        &self,
        prompt: &str,
        max_tokens: u32,
    ) -> impl std::future::Future<Output = AssistResult<String>> + Send;
}

impl Completion for GenerationClient {
    async fn complete(&self, prompt: &str, max_tokens: u32) -> AssistResult<String> {
        GenerationClient::complete(self, prompt, max_tokens).await
    }
}

pub struct Assistant<G = GenerationClient> {
    index: Arc<RetrievalIndex>,
    generator: G,
    top_k: usize,
    max_tokens: u32,
    explanation_max_tokens: u32,
}

impl<G: Completion> Assistant<G> {
    pub fn new(index: Arc<RetrievalIndex>, generator: G, config: &Config) -> Self {
        Self {
            index,
            generator,
            top_k: config.retrieval.top_k,
            max_tokens: config.generation.max_tokens,
            explanation_max_tokens: config.generation.explanation_max_tokens,
        }
    }

    /// Check the request before any network call is made.
    pub fn validate(request: &EditRequest) -> AssistResult<()> {
        if request.instruction.trim().is_empty() || request.code.trim().is_empty() {
            return Err(AssistError::InputValidation(
                "Please provide both the code and an edit request.".to_string(),
            ));
        }
        Ok(())
    }

    /// Run one full interaction and return its final state.
    ///
    /// The returned state is `Done` on success. On failure the phase is
    /// `Failed` (or still `Idle` for validation errors, which never start
    /// the pipeline) with `error`/`error_code` set.
    pub async fn handle(&self, request: &EditRequest) -> InteractionState {
        let mut state = InteractionState::new(&request.code);

        if let Err(e) = Self::validate(request) {
            state.error_code = Some(e.code().to_string());
            state.error = Some(e.to_string());
            return state;
        }

        state.phase = Phase::AwaitingRetrieval;
        let context = match self.index.search_context(&request.instruction, self.top_k).await {
            Ok(ctx) => ctx,
            Err(e) => return fail(state, e),
        };
        state.context = Some(context.clone());

        state.phase = Phase::AwaitingRevision;
        let revised = match self
            .revise_code(&request.instruction, &request.code, &context)
            .await
        {
            Ok(code) => code,
            Err(e) => return fail(state, e),
        };
        state.revised_code = Some(revised.clone());

        state.phase = Phase::AwaitingExplanation;
        let explanation = match self.explain_change(&request.code, &revised).await {
            Ok(text) => text,
            Err(e) => return fail(state, e),
        };
        state.explanation = Some(explanation);

        state.phase = Phase::Done;
        state
    }

    /// One generation call: revise `code` per `instruction`, grounded in the
    /// retrieved guideline context.
    pub async fn revise_code(
        &self,
        instruction: &str,
        code: &str,
        guideline_context: &str,
    ) -> AssistResult<String> {
        let prompt = prompts::revise_prompt(instruction, code, guideline_context);
        self.generator.complete(&prompt, self.max_tokens).await
    }

    /// Second generation call: a short summary of the differences between
    /// the original and revised code.
    pub async fn explain_change(
        &self,
        original_code: &str,
        revised_code: &str,
    ) -> AssistResult<String> {
        let prompt = prompts::explain_prompt(original_code, revised_code);
        self.generator
            .complete(&prompt, self.explanation_max_tokens)
            .await
    }
}

fn fail(mut state: InteractionState, error: AssistError) -> InteractionState {
    state.error_code = Some(error.code().to_string());
    state.error = Some(error.to_string());
    state.phase = Phase::Failed;
    state
}
