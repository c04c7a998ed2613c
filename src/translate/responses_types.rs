//! Wire types for the Responses dialect (`/v1/responses`).
//!
//! These types represent both the request we send to a Responses backend and
//! what it sends back, including the typed stream events.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::content::MessageContent;

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponsesRequest {
    #[serde(default)]
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<ResponsesInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<Reasoning>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel_tool_calls: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    // Native requests keep every field we don't model
    #[serde(flatten)]
    pub extra: std::collections::HashMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ResponsesInput {
    Text(String),
    Items(Vec<InputItem>),
}

/// One flattened input entry. Translators only produce `message` items;
/// native requests may carry any item type, kept in `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InputItem {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub item_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<MessageContent>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl InputItem {
    pub fn message(role: &str, content: Option<MessageContent>) -> Self {
        Self {
            item_type: Some("message".to_string()),
            role: Some(role.to_string()),
            content,
            extra: serde_json::Map::new(),
        }
    }

    pub fn is_message(&self) -> bool {
        !matches!(self.item_type.as_deref(), Some(t) if t != "message") && self.role.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reasoning {
    pub effort: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<Value>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponsesResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub output: Vec<OutputItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<ResponsesUsage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponsesError>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputItem {
    #[serde(rename = "type", default)]
    pub item_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Vec<OutputContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputContent {
    #[serde(rename = "type", default)]
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResponsesUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_tokens_details: Option<InputTokensDetails>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InputTokensDetails {
    #[serde(default)]
    pub cached_tokens: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponsesError {
    #[serde(default)]
    pub message: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<Value>,
}

impl ResponsesError {
    /// Error category: explicit `type`, else a string `code`, else `api_error`.
    pub fn kind(&self) -> String {
        self.error_type
            .clone()
            .filter(|t| !t.is_empty())
            .or_else(|| self.code.as_ref().and_then(Value::as_str).map(String::from))
            .unwrap_or_else(|| "api_error".to_string())
    }
}

/// Built-in tool type billed for an output item type, if the item is a
/// built-in tool invocation.
pub fn builtin_tool_for_item(item_type: &str) -> Option<&'static str> {
    match item_type {
        "web_search_call" => Some("web_search_preview"),
        "file_search_call" => Some("file_search"),
        "code_interpreter_call" => Some("code_interpreter"),
        "image_generation_call" => Some("image_generation"),
        "computer_call" => Some("computer_use_preview"),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Streaming event types
// ---------------------------------------------------------------------------

/// The event types the mapper acts on. Anything else lands in `Unhandled`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEventKind {
    Created,
    InProgress,
    OutputItemAdded,
    OutputTextDelta,
    OutputItemDone,
    Done,
    Completed,
    Unhandled(String),
}

impl StreamEventKind {
    pub fn from_type(event_type: &str) -> Self {
        match event_type {
            "response.created" => Self::Created,
            "response.in_progress" => Self::InProgress,
            "response.output_item.added" => Self::OutputItemAdded,
            "response.output_text.delta" => Self::OutputTextDelta,
            "response.output_item.done" => Self::OutputItemDone,
            "response.done" => Self::Done,
            "response.completed" => Self::Completed,
            other => Self::Unhandled(other.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawStreamEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    response: Option<ResponsesResponse>,
    #[serde(default)]
    item: Option<OutputItem>,
    #[serde(default)]
    delta: Option<Value>,
}

/// One decoded backend stream event.
#[derive(Debug, Clone)]
pub struct StreamEvent {
    pub kind: StreamEventKind,
    pub response: Option<ResponsesResponse>,
    pub item: Option<OutputItem>,
    pub delta: Option<String>,
}

impl StreamEvent {
    /// Decode the JSON payload of one `data:` frame.
    pub fn parse(data: &str) -> serde_json::Result<Self> {
        let raw: RawStreamEvent = serde_json::from_str(data)?;
        Ok(Self {
            kind: StreamEventKind::from_type(&raw.event_type),
            response: raw.response,
            item: raw.item,
            delta: match raw.delta {
                Some(Value::String(s)) => Some(s),
                _ => None,
            },
        })
    }

    pub fn response_id(&self) -> Option<&str> {
        self.response
            .as_ref()
            .map(|r| r.id.as_str())
            .filter(|id| !id.is_empty())
    }
}
