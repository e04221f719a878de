//! Loop controller: drives one turn through the phase machine.
//!
//! ```text
//! Understand -> Retrieve -> Reason -+-> Respond -> Terminal
//!                  ^                |
//!                  +----------------+  (should_continue && steps < max)
//! ```
//!
//! The controller owns the [`TurnState`] for the duration of a turn and never
//! returns an error: every path ends in a [`TurnResult`].

use std::future::Future;
use std::sync::Arc;

use tracing::Instrument;

use super::classify::Classifier;
use super::reason::{ReasonRequest, Reasoner};
use super::respond::compose;
use super::retrieve::{DualRetriever, RetrievalRequest};
use super::state::{Message, TurnResult, TurnState, TurnStatus};
use crate::config::MnemeConfig;
use crate::knowledge::{GraphStore, VectorStore};
use crate::llm::{LanguageModel, LlmError};

pub const FAILURE_RESPONSE: &str =
    "Sorry, I ran into a problem while working on your question. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Understand,
    Retrieve,
    Reason,
    Respond,
    Terminal,
}

/// Next phase after `phase` completes.
///
/// `should_continue` and `reasoning_steps` only matter when leaving `Reason`.
pub fn transition(phase: Phase, should_continue: bool, reasoning_steps: u32, max_steps: u32) -> Phase {
    match phase {
        Phase::Understand => Phase::Retrieve,
        Phase::Retrieve => Phase::Reason,
        Phase::Reason if should_continue && reasoning_steps < max_steps => Phase::Retrieve,
        Phase::Reason => Phase::Respond,
        Phase::Respond | Phase::Terminal => Phase::Terminal,
    }
}

/// The reasoning agent. Cheap to share; holds no per-turn state.
pub struct Agent {
    classifier: Classifier,
    retriever: DualRetriever,
    reasoner: Reasoner,
    max_reasoning_steps: u32,
}

impl Agent {
    pub fn new(
        vector: Arc<dyn VectorStore>,
        graph: Arc<dyn GraphStore>,
        model: Arc<dyn LanguageModel>,
        config: &MnemeConfig,
    ) -> Self {
        let llm = &config.llm;
        Self {
            classifier: Classifier::new(
                model.clone(),
                llm.timeout(),
                llm.classify_max_tokens,
                llm.classify_temperature,
            ),
            retriever: DualRetriever::new(vector, graph, config.retrieval.clone()),
            reasoner: Reasoner::new(
                model,
                llm.timeout(),
                llm.reason_max_tokens,
                llm.reason_temperature,
                config.agent.history_window,
            ),
            max_reasoning_steps: config.agent.max_reasoning_steps,
        }
    }

    /// Process one user turn. `history` is oldest first and is never modified.
    pub async fn run_turn(&self, query: &str, history: Vec<Message>) -> TurnResult {
        let state = TurnState::new(query, history);
        let span = tracing::info_span!("turn", turn_id = %state.turn_id);
        self.drive(state).instrument(span).await
    }

    /// Like [`Agent::run_turn`], but gives up when `cancel` resolves first.
    ///
    /// The in-flight turn is dropped along with any store or model request it
    /// was awaiting. Nothing from a cancelled turn is kept.
    pub async fn run_turn_until<F>(
        &self,
        query: &str,
        history: Vec<Message>,
        cancel: F,
    ) -> Option<TurnResult>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            result = self.run_turn(query, history) => Some(result),
            () = cancel => {
                tracing::info!("turn cancelled");
                None
            }
        }
    }

    async fn drive(&self, mut state: TurnState) -> TurnResult {
        let mut phase = Phase::Understand;
        let mut failure: Option<LlmError> = None;

        while phase != Phase::Terminal {
            let next = match phase {
                Phase::Understand => {
                    let (intent, entities) =
                        self.classifier.classify(state.query(), &state.history).await;
                    tracing::info!(intent = %intent, entities = ?entities, "classified");
                    state.classify(intent, entities);
                    transition(phase, false, state.reasoning_steps, self.max_reasoning_steps)
                }
                Phase::Retrieve => {
                    let retrieval = self
                        .retriever
                        .retrieve(&RetrievalRequest {
                            query: state.query(),
                            intent: state.intent(),
                            entities: state.entities(),
                            context_so_far: state.context(),
                            reasoning_steps: state.reasoning_steps,
                            follow_up: &state.follow_up,
                        })
                        .await;
                    state.partial |= retrieval.partial;
                    state.structural |= retrieval.structural;
                    let added = state.extend_context(retrieval.items);
                    tracing::info!(
                        step = state.reasoning_steps,
                        added,
                        total = state.context().len(),
                        partial = retrieval.partial,
                        "retrieved"
                    );
                    transition(phase, false, state.reasoning_steps, self.max_reasoning_steps)
                }
                Phase::Reason => {
                    let outcome = self
                        .reasoner
                        .reason(&ReasonRequest {
                            query: state.query(),
                            intent: state.intent(),
                            context: state.context(),
                            history: &state.history,
                            structural: state.structural,
                            partial: state.partial,
                            final_step: state.reasoning_steps >= self.max_reasoning_steps,
                        })
                        .await;
                    match outcome {
                        Ok(reasoning) => {
                            state.draft = reasoning.draft;
                            state.should_continue = reasoning.should_continue;
                            state.follow_up = reasoning.follow_up;
                            let next = transition(
                                phase,
                                state.should_continue,
                                state.reasoning_steps,
                                self.max_reasoning_steps,
                            );
                            if next == Phase::Retrieve {
                                state.reasoning_steps += 1;
                                tracing::debug!(step = state.reasoning_steps, "reasoning again");
                            }
                            next
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "reasoning failed");
                            failure = Some(e);
                            Phase::Respond
                        }
                    }
                }
                Phase::Respond => {
                    if failure.is_none() {
                        let composition = compose(&state.draft, state.context());
                        state.set_response(composition.text);
                        return self.finish(state, TurnStatus::Answered, composition.citations);
                    }
                    state.set_response(FAILURE_RESPONSE.to_string());
                    return self.finish(state, TurnStatus::Failed, Vec::new());
                }
                Phase::Terminal => Phase::Terminal,
            };
            phase = next;
        }

        // Respond always returns; reaching here means the machine skipped it.
        self.finish(state, TurnStatus::Failed, Vec::new())
    }

    fn finish(&self, state: TurnState, status: TurnStatus, citations: Vec<String>) -> TurnResult {
        let result = TurnResult {
            turn_id: state.turn_id,
            status,
            response: state.response().unwrap_or(FAILURE_RESPONSE).to_string(),
            citations,
            intent: state.intent(),
            entities: state.entities().to_vec(),
            reasoning_steps_used: state.reasoning_steps,
            partial: state.partial,
        };
        tracing::info!(
            status = ?result.status,
            steps = result.reasoning_steps_used,
            citations = result.citations.len(),
            partial = result.partial,
            "turn complete"
        );
        result
    }
}
