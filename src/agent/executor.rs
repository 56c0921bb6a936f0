//! Agent Executor - the ReAct loop
//!
//! Binds a model, the SQL toolkit, a composed prompt and the session's
//! memory. One `invoke` runs Thought → Action → Observation cycles until the
//! model emits a final answer or the iteration limit is hit.
//!
//! ```text
//! input ──► render prompt (tools, history, scratchpad)
//!              │
//!              ▼
//!          model.chat ──► native tool call? ──► ReAct text? ──► JSON in text?
//!              │                    │
//!              │              run tool, append Observation, loop
//!              ▼
//!          Final Answer ──► memory.save_context ──► AgentOutput
//! ```

use std::time::Instant;

use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use super::memory::MemoryHandle;
use super::observer::{AgentEvent, ProgressObserver};
use super::parser::{parse_react_output, truncate_at_observation, ParseFailure, ReactStep};
use super::prompt::{PromptTemplate, PromptVars};
use crate::db::{SqlTool, ToolkitError, ToolkitHandle};
use crate::metrics::{AGENT_ITERATIONS, AGENT_PARSE_ERRORS, AGENT_TOOL_CALLS, LLM_CALL_TIME};
use crate::ollama::{parse_tool_calls_from_text, ChatError, ChatMessage, ChatRequest, ModelHandle, ToolCall};

/// Output returned when the loop runs out of iterations
pub const ITERATION_LIMIT_MESSAGE: &str = "Agent stopped due to iteration limit or time limit.";

/// Default cap on ReAct iterations
pub const DEFAULT_MAX_ITERATIONS: usize = 15;

/// Shared executor handle held by the session store
pub type ExecutorHandle = std::sync::Arc<AgentExecutor>;

/// Result of one agent invocation
#[derive(Debug, Clone)]
pub struct AgentOutput {
    /// Final answer text (marker stripped)
    pub output: String,
    /// Intermediate tool steps, in order
    pub steps: Vec<AgentStep>,
    /// Number of model calls made
    pub iterations: usize,
    /// Unique trace ID for this invocation
    pub trace_id: String,
    /// True when the iteration limit ended the loop
    pub stopped_early: bool,
}

/// Record of a single tool call (or handled parse failure)
#[derive(Debug, Clone)]
pub struct AgentStep {
    /// Tool name, or `_Exception` for a parse failure
    pub tool: String,
    pub tool_input: String,
    pub observation: String,
    /// Raw completion that produced this step
    pub log: String,
}

/// Error type for agent invocations
#[derive(Debug)]
pub enum AgentError {
    /// Chat model call failed
    Model(ChatError),
    /// Database connection became unusable
    Database(ToolkitError),
    /// Memory could not be updated after the answer
    Memory(ChatError),
}

impl std::fmt::Display for AgentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentError::Model(e) => write!(f, "Model error: {}", e),
            AgentError::Database(e) => write!(f, "{}", e),
            AgentError::Memory(e) => write!(f, "Memory update failed: {}", e),
        }
    }
}

impl std::error::Error for AgentError {}

impl From<ChatError> for AgentError {
    fn from(e: ChatError) -> Self {
        AgentError::Model(e)
    }
}

/// The assembled reasoning loop
pub struct AgentExecutor {
    model: ModelHandle,
    toolkit: ToolkitHandle,
    prompt: PromptTemplate,
    memory: MemoryHandle,
    language: String,
    max_iterations: usize,
}

impl std::fmt::Debug for AgentExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentExecutor")
            .field("model", &self.model.model_name())
            .field("database", &self.toolkit.uri())
            .field("language", &self.language)
            .field("max_iterations", &self.max_iterations)
            .finish()
    }
}

impl AgentExecutor {
    /// Bind the executor's collaborators
    ///
    /// # Arguments
    /// * `model` - chat model driving the loop
    /// * `toolkit` - database tools
    /// * `prompt` - composed template (rules + ReAct layout)
    /// * `memory` - the session's existing memory handle
    /// * `language` - output language baked into `prompt`
    pub fn new(
        model: ModelHandle,
        toolkit: ToolkitHandle,
        prompt: PromptTemplate,
        memory: MemoryHandle,
        language: impl Into<String>,
    ) -> Self {
        Self {
            model,
            toolkit,
            prompt,
            memory,
            language: language.into(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    /// Output language captured when the executor was built
    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn memory(&self) -> &MemoryHandle {
        &self.memory
    }

    pub fn prompt(&self) -> &PromptTemplate {
        &self.prompt
    }

    /// Run the ReAct loop for one user input
    ///
    /// Tool failures are fed back to the model as observations; only model
    /// errors, a dead database connection, or a failed memory update end the
    /// invocation with an error.
    pub async fn invoke(
        &self,
        input: &str,
        observer: &dyn ProgressObserver,
    ) -> Result<AgentOutput, AgentError> {
        let trace_id = Uuid::now_v7().to_string();
        let model_name = self.model.model_name().to_string();

        let root_span = info_span!(
            "agent_invoke",
            trace_id = %trace_id,
            model = %model_name,
            language = %self.language,
            otel.name = "agent_invoke"
        );

        async {
            info!(trace_id = %trace_id, input = %input, "Starting agent invocation");

            let tools = self.toolkit.tools();
            let tool_descriptions = tools
                .iter()
                .map(|t| format!("{}: {}", t.name(), t.description()))
                .collect::<Vec<_>>()
                .join("\n");
            let tool_names = tools.iter().map(|t| t.name()).collect::<Vec<_>>().join(", ");
            let definitions = tools.iter().map(SqlTool::definition).collect::<Vec<_>>();
            let chat_history = self.memory.lock().await.load();

            let mut steps: Vec<AgentStep> = Vec::new();
            let mut scratchpad = String::new();
            let mut iterations = 0;

            while iterations < self.max_iterations {
                iterations += 1;

                let prompt = self.prompt.render(&PromptVars {
                    tools: &tool_descriptions,
                    tool_names: &tool_names,
                    chat_history: &chat_history,
                    input,
                    agent_scratchpad: &scratchpad,
                });
                let request = ChatRequest::new(vec![ChatMessage::user(prompt)])
                    .with_tools(definitions.clone())
                    .with_stop("\nObservation");

                let llm_span = info_span!(
                    "llm_call",
                    trace_id = %trace_id,
                    iteration = iterations,
                    model = %model_name,
                    otel.name = "llm_call"
                );
                let call_start = Instant::now();
                let response = self.model.chat(request).instrument(llm_span).await?;
                let call_secs = call_start.elapsed().as_secs_f64();
                LLM_CALL_TIME.with_label_values(&[&model_name]).observe(call_secs);
                info!(
                    trace_id = %trace_id,
                    iteration = iterations,
                    duration_ms = call_secs * 1000.0,
                    "LLM call completed"
                );

                let text = truncate_at_observation(&response.message.content)
                    .trim()
                    .to_string();
                let step = match response.native_tool_call() {
                    Some(call) => Ok(action_from_call(&text, call)),
                    None => parse_react_output(&text).or_else(|failure| {
                        // some models write the JSON tool call into the text
                        parse_tool_calls_from_text(&text)
                            .into_iter()
                            .next()
                            .map(|call| action_from_call(&text, call))
                            .ok_or(failure)
                    }),
                };

                match step {
                    Ok(ReactStep::Finish { answer, log }) => {
                        if let Some(thought) = extract_thought(&log) {
                            observer.on_event(&AgentEvent::Thought {
                                iteration: iterations,
                                text: thought,
                            });
                        }
                        observer.on_event(&AgentEvent::FinalAnswer {
                            text: answer.clone(),
                        });
                        info!(
                            trace_id = %trace_id,
                            iterations,
                            tool_calls = steps.len(),
                            "Agent invocation completed"
                        );
                        return self
                            .finish(input, answer, steps, iterations, trace_id.clone(), false)
                            .await;
                    }
                    Ok(ReactStep::Action {
                        tool,
                        input: tool_input,
                        log,
                    }) => {
                        if let Some(thought) = extract_thought(&log) {
                            observer.on_event(&AgentEvent::Thought {
                                iteration: iterations,
                                text: thought,
                            });
                        }
                        observer.on_event(&AgentEvent::ToolStart {
                            tool: tool.clone(),
                            input: tool_input.clone(),
                        });
                        AGENT_TOOL_CALLS.with_label_values(&[&tool]).inc();

                        let tool_span = info_span!(
                            "tool_call",
                            trace_id = %trace_id,
                            tool = %tool,
                            otel.name = "tool_call"
                        );
                        let observation = match self
                            .toolkit
                            .run_tool(&tool, &tool_input)
                            .instrument(tool_span)
                            .await
                        {
                            Ok(output) => output,
                            Err(e) if e.is_fatal() => {
                                warn!(trace_id = %trace_id, error = %e, "Database unusable");
                                return Err(AgentError::Database(e));
                            }
                            Err(ToolkitError::UnknownTool(name)) => format!(
                                "{} is not a valid tool, try one of [{}].",
                                name, tool_names
                            ),
                            Err(e) => {
                                warn!(trace_id = %trace_id, tool = %tool, error = %e, "Tool failed");
                                format!("Error: {}", e)
                            }
                        };

                        observer.on_event(&AgentEvent::ToolEnd {
                            tool: tool.clone(),
                            observation: observation.clone(),
                        });
                        scratchpad.push_str(&format!(
                            "{}\nObservation: {}\nThought: ",
                            log, observation
                        ));
                        steps.push(AgentStep {
                            tool,
                            tool_input,
                            observation,
                            log,
                        });
                    }
                    Err(ParseFailure {
                        message,
                        observation,
                    }) => {
                        warn!(trace_id = %trace_id, iteration = iterations, "Unparseable completion");
                        AGENT_PARSE_ERRORS.with_label_values(&[&model_name]).inc();
                        observer.on_event(&AgentEvent::ParseError {
                            message: message.clone(),
                        });
                        scratchpad.push_str(&format!(
                            "{}\nObservation: {}\nThought: ",
                            text, observation
                        ));
                        steps.push(AgentStep {
                            tool: "_Exception".to_string(),
                            tool_input: message,
                            observation,
                            log: text,
                        });
                    }
                }
            }

            warn!(trace_id = %trace_id, iterations, "Max iterations reached");
            self.finish(
                input,
                ITERATION_LIMIT_MESSAGE.to_string(),
                steps,
                iterations,
                trace_id.clone(),
                true,
            )
            .await
        }
        .instrument(root_span)
        .await
    }

    async fn finish(
        &self,
        input: &str,
        output: String,
        steps: Vec<AgentStep>,
        iterations: usize,
        trace_id: String,
        stopped_early: bool,
    ) -> Result<AgentOutput, AgentError> {
        AGENT_ITERATIONS.observe(iterations as f64);
        self.memory
            .lock()
            .await
            .save_context(input, &output)
            .await
            .map_err(AgentError::Memory)?;

        Ok(AgentOutput {
            output,
            steps,
            iterations,
            trace_id,
            stopped_early,
        })
    }
}

/// Turn a structured tool call into a ReAct action with a text log
fn action_from_call(text: &str, call: ToolCall) -> ReactStep {
    let input = call.function.tool_input();
    let action = format!("Action: {}\nAction Input: {}", call.function.name, input);
    let log = if text.is_empty() {
        action
    } else {
        format!("{}\n{}", text, action)
    };
    ReactStep::Action {
        tool: call.function.name,
        input,
        log,
    }
}

/// Reasoning text preceding `Action:` or `Final Answer:`
fn extract_thought(log: &str) -> Option<String> {
    let cut = ["\nAction:", "Action:", "Final Answer:", "{"]
        .iter()
        .filter_map(|m| log.find(m))
        .min()
        .unwrap_or(log.len());
    let thought = log[..cut].trim();
    let thought = thought.strip_prefix("Thought:").unwrap_or(thought).trim();
    if thought.is_empty() {
        None
    } else {
        Some(thought.to_string())
    }
}
