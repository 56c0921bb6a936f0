//! SQL agent: prompt, ReAct loop, memory and lazy assembly
//!
//! # Architecture
//!
//! ```text
//! ensure_executor(store)
//!        │  model client + toolkit present, executor empty
//!        ▼
//! PromptSource.pull("hwchase17/react-chat") ──► compose_prompt(template, language)
//!        │
//!        ▼
//! AgentExecutor { model, toolkit tools, prompt, existing memory }
//!        │
//!        ▼  invoke(input, observer)
//! Ollama /api/chat ──► Action? ──► SqlToolkit.run_tool ──► Observation ──► loop
//!        │
//!        ▼
//! Final Answer ──► ConversationMemory.save_context
//! ```

pub mod assembly;
pub mod executor;
pub mod memory;
pub mod observer;
pub mod parser;
pub mod prompt;

pub use assembly::{ensure_executor, ensure_memory, AssemblyError};
pub use executor::{
    AgentError, AgentExecutor, AgentOutput, AgentStep, ExecutorHandle, DEFAULT_MAX_ITERATIONS,
    ITERATION_LIMIT_MESSAGE,
};
pub use memory::{ConversationMemory, MemoryHandle};
pub use observer::{AgentEvent, NoopObserver, ProgressObserver, TracingObserver};
pub use prompt::{
    compose_prompt, BundledPromptSource, HttpPromptSource, PromptError, PromptSource,
    PromptTemplate, DEFAULT_PROMPT_ID, FINAL_ANSWER_MARKER,
};
