//! Lazy agent assembly
//!
//! Builds the session's `AgentExecutor` when the executor slot is empty and
//! both the model client and the toolkit exist. The executor always binds
//! the session's existing memory handle, so a rebuild (language switch)
//! keeps the conversation summary.

use std::sync::Arc;

use tracing::{debug, info, info_span, warn, Instrument};

use super::executor::{AgentExecutor, ExecutorHandle};
use super::memory::{ConversationMemory, MemoryHandle};
use super::prompt::{compose_prompt, PromptError, PromptSource, PromptTemplate};
use crate::error::{classify_assembly_failure, ErrorKind};
use crate::metrics::EXECUTOR_BUILDS;
use crate::session::SessionStore;

/// Error type for executor assembly
#[derive(Debug)]
pub enum AssemblyError {
    /// Template could not be pulled or failed validation
    Prompt(PromptError),
    /// Tools, memory or executor could not be bound
    Binding(String),
}

impl AssemblyError {
    /// Category used to pick the user-facing notice
    pub fn kind(&self) -> ErrorKind {
        classify_assembly_failure(&self.to_string())
    }
}

impl std::fmt::Display for AssemblyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssemblyError::Prompt(e) => write!(f, "{}", e),
            AssemblyError::Binding(msg) => write!(f, "Toolkit binding failed: {}", msg),
        }
    }
}

impl std::error::Error for AssemblyError {}

impl From<PromptError> for AssemblyError {
    fn from(e: PromptError) -> Self {
        AssemblyError::Prompt(e)
    }
}

/// Return the session's memory, creating it from the model client if absent
///
/// Returns `None` while there is no model client to summarize with.
pub fn ensure_memory(store: &mut SessionStore) -> Option<MemoryHandle> {
    if let Some(memory) = store.memory() {
        return Some(memory.clone());
    }
    let model = store.model_client()?.clone();
    let memory = ConversationMemory::new(model).into_handle();
    store.set_memory(memory.clone());
    debug!("Conversation memory created");
    Some(memory)
}

/// Build the executor if it is missing and its dependencies are present
///
/// Returns the existing handle unchanged when one is already stored, and
/// `Ok(None)` when the model client or toolkit is still missing.
///
/// # Arguments
/// * `store` - the session store to read dependencies from and write into
/// * `prompt_source` - supplies the base ReAct template
/// * `prompt_id` - template identifier passed to the source
/// * `language` - output language embedded in the rule block
/// * `max_iterations` - ReAct iteration cap for the new executor
pub async fn ensure_executor(
    store: &mut SessionStore,
    prompt_source: &dyn PromptSource,
    prompt_id: &str,
    language: &str,
    max_iterations: usize,
) -> Result<Option<ExecutorHandle>, AssemblyError> {
    if let Some(existing) = store.executor() {
        return Ok(Some(existing.clone()));
    }
    let (model, toolkit) = match (store.model_client(), store.toolkit()) {
        (Some(model), Some(toolkit)) => (model.clone(), toolkit.clone()),
        _ => {
            debug!("Executor dependencies missing, skipping assembly");
            return Ok(None);
        }
    };

    let span = info_span!(
        "assemble_executor",
        prompt_id = %prompt_id,
        language = %language,
        otel.name = "assemble_executor"
    );

    let result = async {
        if toolkit.tools().is_empty() {
            return Err(AssemblyError::Binding(
                "no tools could be extracted from the database".to_string(),
            ));
        }

        let template = prompt_source.pull(prompt_id).await?;
        let prompt = PromptTemplate::new(compose_prompt(&template, language))?;

        let memory = ensure_memory(store)
            .ok_or_else(|| AssemblyError::Binding("model client missing".to_string()))?;

        let executor = Arc::new(
            AgentExecutor::new(model, toolkit, prompt, memory, language)
                .with_max_iterations(max_iterations),
        );
        if !store.set_executor(executor.clone()) {
            return Err(AssemblyError::Binding(
                "model client or database not available".to_string(),
            ));
        }
        Ok(executor)
    }
    .instrument(span)
    .await;

    match result {
        Ok(executor) => {
            EXECUTOR_BUILDS.with_label_values(&["built"]).inc();
            info!(language = %language, "Agent executor assembled");
            Ok(Some(executor))
        }
        Err(e) => {
            EXECUTOR_BUILDS.with_label_values(&["failed"]).inc();
            warn!(error = %e, kind = %e.kind(), "Agent executor assembly failed");
            Err(e)
        }
    }
}
