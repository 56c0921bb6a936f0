//! One chat turn: readiness guard, invocation, history update
//!
//! ```text
//!        submit(input)
//! Idle ─────────────────► guard ── missing handle ──► NotReady (Idle, history untouched)
//!                           │
//!                           ▼ push user message
//!                  AwaitingResponse ── executor.invoke ──┐
//!                                                        ▼
//!                        Idle ◄── Completed (push assistant) | Failed (no assistant)
//! ```

use std::fmt;

use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::agent::{ExecutorHandle, ProgressObserver};
use crate::error::{classify_turn_failure, ErrorKind, Notice};
use crate::metrics::CHAT_TURNS;
use crate::session::{Message, SessionStore};

/// Chat loop state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnState {
    #[default]
    Idle,
    AwaitingResponse,
}

/// The first missing precondition for a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    MissingModel,
    MissingToolkit,
    MissingExecutor,
}

impl Readiness {
    pub fn notice(&self) -> Notice {
        match self {
            Readiness::MissingModel => Notice::warning(
                "AI engine is not active. Please set your API key with /key.",
            ),
            Readiness::MissingToolkit => {
                Notice::warning("Database toolkit is missing. Please run /connect.")
            }
            Readiness::MissingExecutor => {
                Notice::warning("Agent is not initialized. Please reload the connection.")
            }
        }
    }
}

impl fmt::Display for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Readiness::MissingModel => write!(f, "model client missing"),
            Readiness::MissingToolkit => write!(f, "toolkit missing"),
            Readiness::MissingExecutor => write!(f, "executor missing"),
        }
    }
}

/// Check the guard in order: model client, toolkit, executor
pub fn check_readiness(store: &SessionStore) -> Result<ExecutorHandle, Readiness> {
    if store.model_client().is_none() {
        return Err(Readiness::MissingModel);
    }
    if store.toolkit().is_none() {
        return Err(Readiness::MissingToolkit);
    }
    store
        .executor()
        .cloned()
        .ok_or(Readiness::MissingExecutor)
}

/// How a submitted input ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Blank input; nothing happened
    Ignored,
    /// Guard failed; agent not invoked
    NotReady(Readiness),
    Completed { answer: String, trace_id: String },
    /// Agent failed; only the user message was recorded
    Failed { kind: ErrorKind, message: String },
}

impl TurnOutcome {
    /// Notice to show, if any (completed turns show the answer instead)
    pub fn notice(&self) -> Option<Notice> {
        match self {
            TurnOutcome::Ignored | TurnOutcome::Completed { .. } => None,
            TurnOutcome::NotReady(readiness) => Some(readiness.notice()),
            TurnOutcome::Failed { kind, .. } => Some(kind.turn_notice()),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            TurnOutcome::Ignored => "ignored",
            TurnOutcome::NotReady(_) => "not_ready",
            TurnOutcome::Completed { .. } => "completed",
            TurnOutcome::Failed { .. } => "failed",
        }
    }
}

/// Drives turns for one session, one at a time
#[derive(Debug, Default)]
pub struct ChatLoop {
    state: TurnState,
}

impl ChatLoop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    /// Run one turn against `store`
    pub async fn submit(
        &mut self,
        store: &mut SessionStore,
        input: &str,
        observer: &dyn ProgressObserver,
    ) -> TurnOutcome {
        let outcome = self.run(store, input, observer).await;
        CHAT_TURNS.with_label_values(&[outcome.label()]).inc();
        outcome
    }

    async fn run(
        &mut self,
        store: &mut SessionStore,
        input: &str,
        observer: &dyn ProgressObserver,
    ) -> TurnOutcome {
        let input = input.trim();
        if input.is_empty() {
            return TurnOutcome::Ignored;
        }

        let executor = match check_readiness(store) {
            Ok(executor) => executor,
            Err(readiness) => {
                warn!(missing = %readiness, "Chat input rejected");
                return TurnOutcome::NotReady(readiness);
            }
        };

        let turn_id = Uuid::now_v7().to_string();
        let span = info_span!(
            "chat_turn",
            turn_id = %turn_id,
            language = %executor.language(),
            otel.name = "chat_turn"
        );

        store.push_message(Message::user(input));
        self.state = TurnState::AwaitingResponse;
        let result = executor.invoke(input, observer).instrument(span).await;
        self.state = TurnState::Idle;

        match result {
            Ok(output) => {
                info!(
                    turn_id = %turn_id,
                    trace_id = %output.trace_id,
                    iterations = output.iterations,
                    stopped_early = output.stopped_early,
                    "Turn completed"
                );
                store.push_message(Message::assistant(output.output.clone()));
                TurnOutcome::Completed {
                    answer: output.output,
                    trace_id: output.trace_id,
                }
            }
            Err(e) => {
                let message = e.to_string();
                let kind = classify_turn_failure(&message);
                warn!(turn_id = %turn_id, kind = %kind, error = %message, "Turn failed");
                TurnOutcome::Failed { kind, message }
            }
        }
    }
}
