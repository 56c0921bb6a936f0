//! Ollama chat message types with tool calling support
//!
//! Message, tool and tool-call shapes for Ollama's `/api/chat` endpoint,
//! plus a fallback parser for models that write their tool calls as JSON
//! in the message text instead of the native `tool_calls` field.

use serde::{Deserialize, Serialize};

/// A message in a chat conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String, // "user" or "assistant"
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
            tool_calls: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
            tool_calls: None,
        }
    }
}

/// A tool call from the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub function: FunctionCall,
}

/// Function call details
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: serde_json::Value,
}

impl FunctionCall {
    /// Flatten the call arguments into the single string input our tools take.
    ///
    /// Accepts `{"tool_input": ...}`, `{"query": ...}`, `{"table_names": ...}`,
    /// a bare string, or falls back to the JSON text of the arguments.
    pub fn tool_input(&self) -> String {
        match &self.arguments {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Object(map) => {
                for key in ["tool_input", "query", "table_names", "input"] {
                    match map.get(key) {
                        Some(serde_json::Value::String(s)) => return s.clone(),
                        Some(serde_json::Value::Array(items)) => {
                            return items
                                .iter()
                                .filter_map(|v| v.as_str())
                                .collect::<Vec<_>>()
                                .join(", ");
                        }
                        _ => {}
                    }
                }
                if map.is_empty() {
                    String::new()
                } else {
                    self.arguments.to_string()
                }
            }
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

/// Tool definition for the model
#[derive(Debug, Clone, Serialize)]
pub struct Tool {
    #[serde(rename = "type")]
    pub tool_type: String, // Always "function"
    pub function: ToolFunction,
}

/// Function definition offered to the model
#[derive(Debug, Clone, Serialize)]
pub struct ToolFunction {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value, // JSON Schema
}

impl Tool {
    /// Tool taking one string argument named `tool_input`
    pub fn single_input(
        name: impl Into<String>,
        description: impl Into<String>,
        input_description: &str,
    ) -> Self {
        Self {
            tool_type: "function".to_string(),
            function: ToolFunction {
                name: name.into(),
                description: description.into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "tool_input": {
                            "type": "string",
                            "description": input_description
                        }
                    },
                    "required": ["tool_input"]
                }),
            },
        }
    }
}

/// Response from /api/chat
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    pub message: ChatMessage,
    pub done: bool,
    #[serde(default)]
    pub eval_count: u32,
    #[serde(default)]
    pub eval_duration: u64,
}

impl ChatResponse {
    /// Build a finished response around an assistant message
    pub fn from_message(message: ChatMessage) -> Self {
        Self {
            message,
            done: true,
            eval_count: 0,
            eval_duration: 0,
        }
    }

    /// First call from the native `tool_calls` field, if the model used it
    pub fn native_tool_call(&self) -> Option<ToolCall> {
        self.message
            .tool_calls
            .as_ref()
            .and_then(|calls| calls.first())
            .cloned()
    }
}

/// Try to parse tool calls from the response content text
///
/// This handles models that output tool calls as JSON in the text
/// instead of using the native tool_calls field.
pub fn parse_tool_calls_from_text(content: &str) -> Vec<ToolCall> {
    let mut tool_calls = Vec::new();

    let content = content.trim();

    // Try parsing the entire content as a tool call
    if let Some(tool_call) = try_parse_tool_call(content) {
        tool_calls.push(tool_call);
        return tool_calls;
    }

    // Look for balanced {...} blocks inside the text
    let mut depth = 0usize;
    let mut start = None;

    for (i, c) in content.char_indices() {
        match c {
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' => {
                if depth == 0 {
                    continue;
                }
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start {
                        let json_str = &content[s..=i];
                        if let Some(tool_call) = try_parse_tool_call(json_str) {
                            tool_calls.push(tool_call);
                        }
                    }
                    start = None;
                }
            }
            _ => {}
        }
    }

    tool_calls
}

/// Try to parse a single tool call from a JSON string
fn try_parse_tool_call(json_str: &str) -> Option<ToolCall> {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(json_str) {
        return parse_tool_call_from_value(&value);
    }

    // SQL literals often arrive with unescaped quotes
    if let Some(fixed) = try_fix_malformed_json(json_str) {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&fixed) {
            return parse_tool_call_from_value(&value);
        }
    }

    None
}

/// Escape stray double quotes inside a `"query": "..."` or `"tool_input": "..."` value
fn try_fix_malformed_json(json_str: &str) -> Option<String> {
    let (marker_start, marker) = ["\"query\": \"", "\"tool_input\": \""]
        .iter()
        .find_map(|m| json_str.find(m).map(|pos| (pos, *m)))?;
    let value_start = marker_start + marker.len();

    let remaining = &json_str[value_start..];
    let end_pattern = remaining.rfind("\"}}")?;
    let value = &remaining[..end_pattern];

    let escaped = value
        .replace("\\\"", "\u{FFFF}")
        .replace('"', "\\\"")
        .replace('\u{FFFF}', "\\\"");

    let prefix = &json_str[..value_start];
    let suffix = &json_str[value_start + end_pattern..];

    Some(format!("{}{}{}", prefix, escaped, suffix))
}

/// Parse a tool call from a JSON Value
fn parse_tool_call_from_value(value: &serde_json::Value) -> Option<ToolCall> {
    // Expected format: {"name": "...", "arguments": {...}}
    let name = value.get("name").and_then(|n| n.as_str())?;

    // Some models use "parameters" instead of "arguments"
    let arguments = value
        .get("arguments")
        .or_else(|| value.get("parameters"))?
        .clone();

    Some(ToolCall {
        function: FunctionCall {
            name: name.to_string(),
            arguments,
        },
    })
}
