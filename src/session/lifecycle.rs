//! Lifecycle events and the slots they invalidate
//!
//! ```text
//! Event               cleared                                      kept
//! CredentialChanged   history model toolkit memory executor        -
//! FullReset           history model toolkit memory executor        -
//! ScreenClear         history                                      model toolkit memory executor
//! LanguageChanged     executor                                     history model toolkit memory
//! ```
//!
//! Handlers are synchronous. Cleared handles are rebuilt lazily on the next
//! refresh.

use std::fmt;

use tracing::info;

use super::store::{SessionStore, Slot};
use crate::error::Notice;
use crate::metrics::LIFECYCLE_EVENTS;

/// A user action that invalidates cached state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    CredentialChanged,
    FullReset,
    ScreenClear,
    LanguageChanged,
}

/// Which slots an event clears
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetPlan {
    pub cleared: Vec<Slot>,
}

impl ResetPlan {
    pub fn clears(&self, slot: Slot) -> bool {
        self.cleared.contains(&slot)
    }

    /// Slots left untouched
    pub fn preserved(&self) -> Vec<Slot> {
        Slot::ALL
            .iter()
            .copied()
            .filter(|slot| !self.clears(*slot))
            .collect()
    }
}

impl LifecycleEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::CredentialChanged => "credential_changed",
            LifecycleEvent::FullReset => "full_reset",
            LifecycleEvent::ScreenClear => "screen_clear",
            LifecycleEvent::LanguageChanged => "language_changed",
        }
    }

    pub fn plan(&self) -> ResetPlan {
        let cleared = match self {
            LifecycleEvent::CredentialChanged | LifecycleEvent::FullReset => Slot::ALL.to_vec(),
            LifecycleEvent::ScreenClear => vec![Slot::History],
            LifecycleEvent::LanguageChanged => vec![Slot::Executor],
        };
        ResetPlan { cleared }
    }

    pub fn notice(&self) -> Notice {
        match self {
            LifecycleEvent::CredentialChanged => Notice::info("API key updated! System reset."),
            LifecycleEvent::FullReset => Notice::info("System fully reset. Memory wiped!"),
            LifecycleEvent::ScreenClear => Notice::info("Screen cleared! Memory retained."),
            LifecycleEvent::LanguageChanged => {
                Notice::info("Language preference updated! Reconfiguring AI agent...")
            }
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Clear the slots `event` invalidates and return the user notice
pub fn apply(store: &mut SessionStore, event: LifecycleEvent) -> Notice {
    let plan = event.plan();
    for slot in &plan.cleared {
        store.clear(*slot);
    }
    LIFECYCLE_EVENTS.with_label_values(&[event.name()]).inc();
    info!(
        event = %event,
        cleared = plan.cleared.len(),
        preserved = plan.preserved().len(),
        "Lifecycle event applied"
    );
    event.notice()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::agent::prompt::REACT_CHAT_TEMPLATE;
    use crate::agent::{compose_prompt, AgentExecutor, ConversationMemory, PromptTemplate};
    use crate::db::SqlToolkit;
    use crate::ollama::{MockChatModel, ModelHandle};
    use crate::session::Message;

    fn populated() -> SessionStore {
        let model: ModelHandle = Arc::new(MockChatModel::new([]));
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let toolkit = Arc::new(SqlToolkit::from_connection(conn, "sqlite::memory:", model.clone()));
        let memory = ConversationMemory::new(model.clone()).into_handle();
        let prompt = PromptTemplate::new(compose_prompt(REACT_CHAT_TEMPLATE, "English")).unwrap();
        let executor = Arc::new(AgentExecutor::new(
            model.clone(),
            toolkit.clone(),
            prompt,
            memory.clone(),
            "English",
        ));

        let mut store = SessionStore::new();
        store.push_message(Message::user("q"));
        store.push_message(Message::assistant("a"));
        store.push_message(Message::user("q2"));
        store.set_model_client(model);
        store.set_toolkit(toolkit);
        store.set_memory(memory);
        assert!(store.set_executor(executor));
        store
    }

    #[test]
    fn test_language_change_only_drops_executor() {
        let mut store = populated();
        let model = store.model_client().cloned().unwrap();
        let toolkit = store.toolkit().cloned().unwrap();
        let memory = store.memory().cloned().unwrap();

        let notice = apply(&mut store, LifecycleEvent::LanguageChanged);
        assert!(notice.text.contains("Language preference updated"));
        assert!(store.executor().is_none());
        assert_eq!(store.history().len(), 3);
        assert!(Arc::ptr_eq(store.model_client().unwrap(), &model));
        assert!(Arc::ptr_eq(store.toolkit().unwrap(), &toolkit));
        assert!(Arc::ptr_eq(store.memory().unwrap(), &memory));
    }

    #[test]
    fn test_credential_change_and_full_reset_empty_everything() {
        for event in [LifecycleEvent::CredentialChanged, LifecycleEvent::FullReset] {
            let mut store = populated();
            apply(&mut store, event);
            for slot in Slot::ALL {
                assert!(!store.is_populated(slot), "{} kept {}", event, slot.name());
            }

            // also holds on an already-empty store
            let mut empty = SessionStore::new();
            apply(&mut empty, event);
            assert_eq!(empty.status().messages, 0);
        }
    }

    #[test]
    fn test_screen_clear_keeps_handles() {
        let mut store = populated();
        let executor = store.executor().cloned().unwrap();

        let notice = apply(&mut store, LifecycleEvent::ScreenClear);
        assert_eq!(notice.text, "Screen cleared! Memory retained.");
        assert!(store.history().is_empty());
        assert!(store.model_client().is_some());
        assert!(store.toolkit().is_some());
        assert!(store.memory().is_some());
        assert!(Arc::ptr_eq(store.executor().unwrap(), &executor));
    }

    #[test]
    fn test_plans() {
        let plan = LifecycleEvent::ScreenClear.plan();
        assert_eq!(plan.cleared, vec![Slot::History]);
        assert_eq!(plan.preserved().len(), 4);
        assert!(LifecycleEvent::FullReset.plan().preserved().is_empty());
        assert!(LifecycleEvent::LanguageChanged.plan().clears(Slot::Executor));
    }
}
