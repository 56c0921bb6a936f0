//! InsightSQL - natural-language chat over a SQL database
//!
//! A ReAct agent, driven by an Ollama-served model, answers questions about
//! a SQLite database using three read-only tools. Around the agent sits a
//! small per-session state machine that decides when the cached model
//! client, database toolkit, conversation memory and executor must be
//! rebuilt.
//!
//! # Modules
//!
//! - `session` - session store, lifecycle events and the per-session context
//! - `agent` - prompt composition, ReAct executor, memory, assembly
//! - `chat` - one chat turn: readiness guard, invocation, history update
//! - `db` - SQLite toolkit (list tables, inspect schema, run query)
//! - `ollama` - chat client and tool-calling message types
//! - `error` - error classification and user-facing notices
//! - `config` - environment and default configuration
//! - `metrics` - Prometheus metrics
//! - `telemetry` - tracing subscriber and OpenTelemetry export
//!
//! # Quick Start
//!
//! ```ignore
//! use insightsql::{AppConfig, SessionContext};
//!
//! let mut session = SessionContext::with_defaults(AppConfig::from_env());
//! session.set_credential("my-key");
//! session.refresh().await;
//! session.connect().await;
//! session.refresh().await;
//! let outcome = session.submit("List all tables", &insightsql::agent::NoopObserver).await;
//! ```

pub mod agent;
pub mod chat;
pub mod config;
pub mod db;
pub mod error;
pub mod metrics;
pub mod ollama;
pub mod session;
pub mod telemetry;

// Re-export commonly used types at crate root for convenience
pub use config::AppConfig;
pub use error::{ErrorKind, Notice, NoticeLevel};
pub use session::{LifecycleEvent, SessionContext, SessionStore};
