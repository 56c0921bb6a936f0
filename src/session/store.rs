//! Per-session state slots
//!
//! Five slots: chat history plus four handles (model client, toolkit,
//! memory, executor). Clearing a slot never touches another one.

use std::fmt;

use crate::agent::{ExecutorHandle, MemoryHandle};
use crate::db::ToolkitHandle;
use crate::ollama::ModelHandle;

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// One displayed turn of conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub text: String,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

/// Names of the store's slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    History,
    ModelClient,
    Toolkit,
    Memory,
    Executor,
}

impl Slot {
    pub const ALL: [Slot; 5] = [
        Slot::History,
        Slot::ModelClient,
        Slot::Toolkit,
        Slot::Memory,
        Slot::Executor,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Slot::History => "history",
            Slot::ModelClient => "model_client",
            Slot::Toolkit => "toolkit",
            Slot::Memory => "memory",
            Slot::Executor => "executor",
        }
    }
}

/// Snapshot of which slots are populated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStatus {
    pub messages: usize,
    pub model_client: bool,
    pub toolkit: bool,
    pub memory: bool,
    pub executor: bool,
}

/// The session's state slots
#[derive(Default)]
pub struct SessionStore {
    history: Vec<Message>,
    model_client: Option<ModelHandle>,
    toolkit: Option<ToolkitHandle>,
    memory: Option<MemoryHandle>,
    executor: Option<ExecutorHandle>,
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore")
            .field("status", &self.status())
            .finish()
    }
}

impl SessionStore {
    /// Empty history, no handles
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn push_message(&mut self, message: Message) {
        self.history.push(message);
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub fn model_client(&self) -> Option<&ModelHandle> {
        self.model_client.as_ref()
    }

    pub fn set_model_client(&mut self, model: ModelHandle) {
        self.model_client = Some(model);
    }

    pub fn clear_model_client(&mut self) {
        self.model_client = None;
    }

    pub fn toolkit(&self) -> Option<&ToolkitHandle> {
        self.toolkit.as_ref()
    }

    pub fn set_toolkit(&mut self, toolkit: ToolkitHandle) {
        self.toolkit = Some(toolkit);
    }

    pub fn clear_toolkit(&mut self) {
        self.toolkit = None;
    }

    pub fn memory(&self) -> Option<&MemoryHandle> {
        self.memory.as_ref()
    }

    pub fn set_memory(&mut self, memory: MemoryHandle) {
        self.memory = Some(memory);
    }

    pub fn clear_memory(&mut self) {
        self.memory = None;
    }

    pub fn executor(&self) -> Option<&ExecutorHandle> {
        self.executor.as_ref()
    }

    /// Store an executor; refused while the model client or toolkit is absent
    pub fn set_executor(&mut self, executor: ExecutorHandle) -> bool {
        if self.model_client.is_none() || self.toolkit.is_none() {
            return false;
        }
        self.executor = Some(executor);
        true
    }

    pub fn clear_executor(&mut self) {
        self.executor = None;
    }

    /// Clear one slot by name
    pub fn clear(&mut self, slot: Slot) {
        match slot {
            Slot::History => self.clear_history(),
            Slot::ModelClient => self.clear_model_client(),
            Slot::Toolkit => self.clear_toolkit(),
            Slot::Memory => self.clear_memory(),
            Slot::Executor => self.clear_executor(),
        }
    }

    /// Whether a slot holds a value (non-empty history counts)
    pub fn is_populated(&self, slot: Slot) -> bool {
        match slot {
            Slot::History => !self.history.is_empty(),
            Slot::ModelClient => self.model_client.is_some(),
            Slot::Toolkit => self.toolkit.is_some(),
            Slot::Memory => self.memory.is_some(),
            Slot::Executor => self.executor.is_some(),
        }
    }

    pub fn status(&self) -> StoreStatus {
        StoreStatus {
            messages: self.history.len(),
            model_client: self.model_client.is_some(),
            toolkit: self.toolkit.is_some(),
            memory: self.memory.is_some(),
            executor: self.executor.is_some(),
        }
    }
}
