//! Progress events streamed out of the ReAct loop
//!
//! Observers only watch; they never change control flow.

use tracing::debug;

/// An intermediate step of one agent invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    /// Model reasoning preceding an action or answer
    Thought { iteration: usize, text: String },
    /// A tool is about to run
    ToolStart { tool: String, input: String },
    /// A tool returned (or failed with a recoverable error)
    ToolEnd { tool: String, observation: String },
    /// Completion could not be parsed; the agent is asked to retry
    ParseError { message: String },
    /// Terminal answer
    FinalAnswer { text: String },
}

/// Sink for progress events
pub trait ProgressObserver: Send + Sync {
    fn on_event(&self, event: &AgentEvent);
}

/// Discards all events
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {
    fn on_event(&self, _event: &AgentEvent) {}
}

/// Forwards events to the tracing subscriber at debug level
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl ProgressObserver for TracingObserver {
    fn on_event(&self, event: &AgentEvent) {
        match event {
            AgentEvent::Thought { iteration, text } => {
                debug!(iteration, thought = %text, "Agent thought")
            }
            AgentEvent::ToolStart { tool, input } => {
                debug!(tool = %tool, input = %input, "Tool start")
            }
            AgentEvent::ToolEnd { tool, observation } => {
                debug!(tool = %tool, observation_len = observation.len(), "Tool end")
            }
            AgentEvent::ParseError { message } => debug!(message = %message, "Parse error"),
            AgentEvent::FinalAnswer { text } => debug!(answer_len = text.len(), "Final answer"),
        }
    }
}
