//! Ollama chat client and model provider
//!
//! `ChatModel` is the seam the agent talks through: the production
//! implementation is `ChatClient` (HTTP against `/api/chat`), tests plug in
//! scripted models. `ModelProvider` turns a credential into a shared model
//! handle.

use std::sync::Arc;

use async_trait::async_trait;

use super::tool_use::{ChatMessage, ChatResponse, Tool};

/// A single request to the chat model
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    /// Conversation so far
    pub messages: Vec<ChatMessage>,
    /// Tools the model may call natively
    pub tools: Option<Vec<Tool>>,
    /// Stop sequences (e.g. "\nObservation" for ReAct prompting)
    pub stop: Vec<String>,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn with_tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_stop(mut self, stop: impl Into<String>) -> Self {
        self.stop.push(stop.into());
        self
    }
}

/// Error type for chat operations
#[derive(Debug)]
pub enum ChatError {
    /// Transport-level failure (DNS, refused connection, TLS, ...)
    Request(reqwest::Error),
    /// Server answered with a non-success status
    Status { status: u16, body: String },
    /// Body could not be decoded
    Parse(serde_json::Error),
    /// Server returned an empty body
    EmptyResponse,
    /// No credential was supplied
    MissingCredential,
}

impl std::fmt::Display for ChatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatError::Request(e) => write!(f, "Request error: {}", e),
            ChatError::Status { status, body } => write!(f, "HTTP {}: {}", status, body),
            ChatError::Parse(e) => write!(f, "Error parsing model response: {}", e),
            ChatError::EmptyResponse => write!(f, "Empty response from Ollama"),
            ChatError::MissingCredential => write!(f, "Missing api_key for the model provider"),
        }
    }
}

impl std::error::Error for ChatError {}

impl From<reqwest::Error> for ChatError {
    fn from(e: reqwest::Error) -> Self {
        ChatError::Request(e)
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(e: serde_json::Error) -> Self {
        ChatError::Parse(e)
    }
}

/// A callable inference handle
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Model identifier (e.g. "qwen3")
    fn model_name(&self) -> &str;

    /// Send one chat request and wait for the full reply
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ChatError>;
}

/// Shared model handle held by the session store
pub type ModelHandle = Arc<dyn ChatModel>;

/// Creates model handles from a credential
pub trait ModelProvider: Send + Sync {
    fn connect(
        &self,
        credential: &str,
        model: &str,
        temperature: f32,
    ) -> Result<ModelHandle, ChatError>;
}

/// Client for Ollama's /api/chat endpoint with tool support
#[derive(Clone)]
pub struct ChatClient {
    base_url: String,
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
    temperature: f32,
}

impl ChatClient {
    /// Create a new chat client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the Ollama server (e.g., "http://localhost:11434")
    /// * `model` - The model name (e.g., "qwen3")
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            api_key: None,
            model: model.into(),
            temperature: 0.0,
        }
    }

    /// Send the credential as a bearer token (Ollama behind a proxy or ollama.com)
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Sampling temperature; low values keep SQL generation deterministic
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

#[async_trait]
impl ChatModel for ChatClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    /// Send a chat request with optional tools
    ///
    /// Non-2xx replies become `ChatError::Status` so the status code stays
    /// visible to error classification (401/403/429).
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ChatError> {
        let endpoint = format!("{}/api/chat", self.base_url);

        let mut options = serde_json::json!({
            "temperature": self.temperature
        });
        if !request.stop.is_empty() {
            options["stop"] = serde_json::to_value(&request.stop)?;
        }

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": request.messages,
            "stream": false,
            "options": options
        });

        if let Some(t) = request.tools {
            body["tools"] = serde_json::to_value(t)?;
        }

        let mut http = self.client.post(&endpoint).json(&body);
        if let Some(key) = &self.api_key {
            http = http.bearer_auth(key);
        }

        let response = http.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(ChatError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        if text.is_empty() {
            return Err(ChatError::EmptyResponse);
        }

        let chat_response: ChatResponse = serde_json::from_str(&text)?;
        Ok(chat_response)
    }
}

/// Provider that hands out `ChatClient`s for one Ollama server
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    base_url: String,
}

impl OllamaProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

impl ModelProvider for OllamaProvider {
    fn connect(
        &self,
        credential: &str,
        model: &str,
        temperature: f32,
    ) -> Result<ModelHandle, ChatError> {
        let credential = credential.trim();
        if credential.is_empty() {
            return Err(ChatError::MissingCredential);
        }
        let client = ChatClient::new(self.base_url.clone(), model)
            .with_api_key(credential)
            .with_temperature(temperature);
        Ok(Arc::new(client))
    }
}
