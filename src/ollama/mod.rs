//! Ollama LLM integration module
//!
//! This module provides a client for Ollama's `/api/chat` API with tool
//! calling, and the `ChatModel` / `ModelProvider` traits the rest of the
//! crate depends on.

pub mod client;
#[cfg(any(test, feature = "test-support"))]
pub mod mock;
pub mod tool_use;

// Re-export public types so other modules can do `use crate::ollama::ChatClient`
pub use client::{
    ChatClient, ChatError, ChatModel, ChatRequest, ModelHandle, ModelProvider, OllamaProvider,
};
#[cfg(any(test, feature = "test-support"))]
pub use mock::{MockChatModel, MockProvider, MockReply};
pub use tool_use::{
    parse_tool_calls_from_text, ChatMessage, ChatResponse, FunctionCall, Tool, ToolCall,
    ToolFunction,
};
