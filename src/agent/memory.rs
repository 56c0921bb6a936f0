//! Summarizing conversation memory
//!
//! Keeps a running summary of the conversation instead of the full
//! transcript. After every completed turn the model folds the new exchange
//! into the summary. The handle outlives executor rebuilds, which is how the
//! agent remembers earlier turns after a language switch or screen clear.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::ollama::{ChatError, ChatMessage, ChatModel, ChatRequest, ModelHandle};

/// Shared memory handle held by the session store and the executor
pub type MemoryHandle = Arc<Mutex<ConversationMemory>>;

/// Leading text of every summarization request
pub const SUMMARY_PROMPT_PREFIX: &str = "Progressively summarize the lines of conversation";

const SUMMARY_PROMPT: &str = r#"Progressively summarize the lines of conversation provided, adding onto the previous summary returning a new summary.

EXAMPLE
Current summary:
The human asks how many tables the database has. The AI lists three tables: dresses, sales and customers.

New lines of conversation:
Human: Which dress style sells best?
AI: Casual dresses sell best, with 1,204 units sold.

New summary:
The human asks how many tables the database has. The AI lists three tables: dresses, sales and customers. The human then asks which dress style sells best and the AI answers Casual, with 1,204 units sold.
END OF EXAMPLE

Current summary:
{summary}

New lines of conversation:
{new_lines}

New summary:"#;

/// Running summary of the conversation, maintained by the model
pub struct ConversationMemory {
    model: ModelHandle,
    summary: String,
    turns: usize,
}

impl std::fmt::Debug for ConversationMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationMemory")
            .field("summary", &self.summary)
            .field("turns", &self.turns)
            .finish()
    }
}

impl ConversationMemory {
    pub fn new(model: ModelHandle) -> Self {
        Self {
            model,
            summary: String::new(),
            turns: 0,
        }
    }

    /// Wrap into a shareable handle
    pub fn into_handle(self) -> MemoryHandle {
        Arc::new(Mutex::new(self))
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    /// Number of turns folded into the summary
    pub fn turns(&self) -> usize {
        self.turns
    }

    /// Text for the `{chat_history}` slot of the agent prompt
    pub fn load(&self) -> String {
        if self.summary.is_empty() {
            String::new()
        } else {
            format!("System: {}", self.summary)
        }
    }

    /// Fold one exchange into the summary
    pub async fn save_context(&mut self, input: &str, output: &str) -> Result<(), ChatError> {
        let new_lines = format!("Human: {}\nAI: {}", input, output);
        let summary = summarize(self.model.as_ref(), &self.summary, &new_lines).await?;
        debug!(turns = self.turns + 1, summary_len = summary.len(), "Memory summary updated");
        self.summary = summary;
        self.turns += 1;
        Ok(())
    }
}

async fn summarize(
    model: &dyn ChatModel,
    summary: &str,
    new_lines: &str,
) -> Result<String, ChatError> {
    let prompt = SUMMARY_PROMPT
        .replace("{summary}", summary)
        .replace("{new_lines}", new_lines);
    let response = model
        .chat(ChatRequest::new(vec![ChatMessage::user(prompt)]))
        .await?;
    Ok(response.message.content.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    use crate::ollama::ChatResponse;

    /// Echoes back a canned summary and records the prompts it saw
    struct Summarizer {
        prompts: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl ChatModel for Summarizer {
        fn model_name(&self) -> &str {
            "summarizer"
        }

        async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ChatError> {
            let prompt = request.messages[0].content.clone();
            let mut prompts = self.prompts.lock().unwrap();
            prompts.push(prompt);
            Ok(ChatResponse::from_message(ChatMessage::assistant(format!(
                "  summary #{}  ",
                prompts.len()
            ))))
        }
    }

    #[tokio::test]
    async fn test_save_context_updates_summary() {
        let model = Arc::new(Summarizer {
            prompts: StdMutex::new(Vec::new()),
        });
        let mut memory = ConversationMemory::new(model.clone());
        assert_eq!(memory.load(), "");

        memory.save_context("How many tables?", "Two.").await.unwrap();
        assert_eq!(memory.summary(), "summary #1");
        assert_eq!(memory.load(), "System: summary #1");

        memory.save_context("Which one is biggest?", "dresses").await.unwrap();
        assert_eq!(memory.turns(), 2);

        let prompts = model.prompts.lock().unwrap();
        assert!(prompts[0].contains("Human: How many tables?\nAI: Two."));
        assert!(prompts[1].contains("Current summary:\nsummary #1\n"));
    }

    #[test]
    fn test_prompt_starts_with_prefix() {
        assert!(SUMMARY_PROMPT.starts_with(SUMMARY_PROMPT_PREFIX));
    }
}
