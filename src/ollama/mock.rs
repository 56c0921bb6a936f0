//! Scripted chat model for tests
//!
//! `MockChatModel` replays a queue of canned replies in order. Memory
//! summarization requests are answered separately so scripts only describe
//! the agent's own completions. When the script runs dry the model answers
//! with a fixed final answer.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::client::{ChatError, ChatModel, ChatRequest, ModelHandle, ModelProvider};
use super::tool_use::{ChatMessage, ChatResponse, FunctionCall, ToolCall};
use crate::agent::memory::SUMMARY_PROMPT_PREFIX;

/// One canned reply
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Plain completion text
    Text(String),
    /// Native tool call with `{"tool_input": input}`
    ToolCall { name: String, input: String },
    /// Non-success HTTP status
    Status { status: u16, body: String },
}

impl MockReply {
    pub fn text(text: impl Into<String>) -> Self {
        MockReply::Text(text.into())
    }

    /// ReAct-formatted action
    pub fn action(tool: &str, input: &str) -> Self {
        MockReply::Text(format!(
            "Thought: Do I need to use a tool? Yes\nAction: {}\nAction Input: {}",
            tool, input
        ))
    }

    /// ReAct-formatted final answer
    pub fn answer(text: &str) -> Self {
        MockReply::Text(format!(
            "Thought: Do I need to use a tool? No\nFinal Answer: {}",
            text
        ))
    }

    pub fn tool_call(name: &str, input: &str) -> Self {
        MockReply::ToolCall {
            name: name.to_string(),
            input: input.to_string(),
        }
    }

    pub fn status(status: u16, body: &str) -> Self {
        MockReply::Status {
            status,
            body: body.to_string(),
        }
    }
}

/// Chat model that replays scripted replies
pub struct MockChatModel {
    name: String,
    script: Mutex<VecDeque<MockReply>>,
    prompts: Mutex<Vec<String>>,
    agent_calls: AtomicUsize,
    summary_calls: AtomicUsize,
}

impl MockChatModel {
    pub fn new(replies: impl IntoIterator<Item = MockReply>) -> Self {
        Self {
            name: "mock".to_string(),
            script: Mutex::new(replies.into_iter().collect()),
            prompts: Mutex::new(Vec::new()),
            agent_calls: AtomicUsize::new(0),
            summary_calls: AtomicUsize::new(0),
        }
    }

    /// Agent (non-summary) calls served so far
    pub fn agent_calls(&self) -> usize {
        self.agent_calls.load(Ordering::SeqCst)
    }

    pub fn summary_calls(&self) -> usize {
        self.summary_calls.load(Ordering::SeqCst)
    }

    /// Prompts of the agent calls, in order
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ChatModel for MockChatModel {
    fn model_name(&self) -> &str {
        &self.name
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ChatError> {
        let prompt = request
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();

        if prompt.starts_with(SUMMARY_PROMPT_PREFIX) {
            let n = self.summary_calls.fetch_add(1, Ordering::SeqCst) + 1;
            return Ok(ChatResponse::from_message(ChatMessage::assistant(format!(
                "Conversation summary after {} turn(s).",
                n
            ))));
        }

        self.agent_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt);
        }

        let reply = self
            .script
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front())
            .unwrap_or_else(|| MockReply::answer("I have nothing more to add."));

        match reply {
            MockReply::Text(text) => Ok(ChatResponse::from_message(ChatMessage::assistant(text))),
            MockReply::ToolCall { name, input } => {
                let mut message = ChatMessage::assistant("");
                message.tool_calls = Some(vec![ToolCall {
                    function: FunctionCall {
                        name,
                        arguments: serde_json::json!({ "tool_input": input }),
                    },
                }]);
                Ok(ChatResponse::from_message(message))
            }
            MockReply::Status { status, body } => Err(ChatError::Status { status, body }),
        }
    }
}

/// Provider handing out one shared `MockChatModel`
pub struct MockProvider {
    model: Arc<MockChatModel>,
    connects: AtomicUsize,
}

impl MockProvider {
    pub fn new(model: Arc<MockChatModel>) -> Self {
        Self {
            model,
            connects: AtomicUsize::new(0),
        }
    }

    pub fn model(&self) -> &Arc<MockChatModel> {
        &self.model
    }

    /// How many times `connect` succeeded
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl ModelProvider for MockProvider {
    fn connect(
        &self,
        credential: &str,
        _model: &str,
        _temperature: f32,
    ) -> Result<ModelHandle, ChatError> {
        if credential.trim().is_empty() {
            return Err(ChatError::MissingCredential);
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        let model: ModelHandle = self.model.clone();
        Ok(model)
    }
}
