//! Prometheus metrics for InsightSQL
//!
//! All metrics live in the default registry. `gather_text()` renders them in
//! the text exposition format for the REPL's `/metrics` command.

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter_vec, Encoder, Histogram,
    HistogramVec, IntCounterVec, TextEncoder,
};

lazy_static! {
    /// Chat turns by outcome (completed, failed, not_ready)
    pub static ref CHAT_TURNS: IntCounterVec = register_int_counter_vec!(
        "insightsql_chat_turns_total",
        "Chat turns by outcome",
        &["outcome"]
    )
    .expect("chat turn counter registers");

    /// ReAct iterations needed per invocation
    pub static ref AGENT_ITERATIONS: Histogram = register_histogram!(
        "insightsql_agent_iterations",
        "ReAct iterations per agent invocation",
        vec![1.0, 2.0, 3.0, 5.0, 8.0, 12.0, 15.0, 20.0]
    )
    .expect("iteration histogram registers");

    /// Tool calls by tool name
    pub static ref AGENT_TOOL_CALLS: IntCounterVec = register_int_counter_vec!(
        "insightsql_agent_tool_calls_total",
        "Tool calls made by the agent",
        &["tool"]
    )
    .expect("tool call counter registers");

    /// Parse failures handed back to the model
    pub static ref AGENT_PARSE_ERRORS: IntCounterVec = register_int_counter_vec!(
        "insightsql_agent_parse_errors_total",
        "Unparseable completions retried by the agent",
        &["model"]
    )
    .expect("parse error counter registers");

    /// Model call latency in seconds
    pub static ref LLM_CALL_TIME: HistogramVec = register_histogram_vec!(
        "insightsql_llm_call_seconds",
        "Latency of chat model calls",
        &["model"],
        vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
    )
    .expect("llm latency histogram registers");

    /// Executor builds by result (built, failed)
    pub static ref EXECUTOR_BUILDS: IntCounterVec = register_int_counter_vec!(
        "insightsql_executor_builds_total",
        "Agent executor assemblies",
        &["result"]
    )
    .expect("executor build counter registers");

    /// Lifecycle events applied to session stores
    pub static ref LIFECYCLE_EVENTS: IntCounterVec = register_int_counter_vec!(
        "insightsql_lifecycle_events_total",
        "Session lifecycle events",
        &["event"]
    )
    .expect("lifecycle counter registers");
}

/// Render every registered metric in the Prometheus text format
pub fn gather_text() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
