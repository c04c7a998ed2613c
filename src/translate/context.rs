//! Per-request state for a translated exchange.
//!
//! A [`ConversionContext`] is built by the router when it decides to translate
//! a request, and is then owned by that request alone: the stream mapper and
//! the response assembler receive it explicitly and it is dropped when the
//! response has been written.

use std::collections::BTreeMap;

use super::chat_types::ChatCompletionRequest;
use super::messages_types::MessagesRequest;
use super::responses_types::builtin_tool_for_item;
use super::usage::UsageCounter;
use super::Dialect;

/// Every streamed text block is written at this content-block index. The
/// mapper does not track concurrent blocks or tool-call streams.
pub const CONTENT_BLOCK_INDEX: usize = 0;

/// The caller's request as it arrived, kept for the response path.
#[derive(Debug, Clone)]
pub enum OriginalRequest {
    Messages(MessagesRequest),
    Chat(ChatCompletionRequest),
}

impl OriginalRequest {
    /// The dialect the request was converted from.
    pub fn dialect(&self) -> Dialect {
        match self {
            OriginalRequest::Messages(_) => Dialect::Messages,
            OriginalRequest::Chat(_) => Dialect::Chat,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    Idle,
    Started,
    Streaming,
    Done,
}

#[derive(Debug, Clone)]
pub struct ConversionContext {
    pub original: OriginalRequest,
    pub upstream_model: String,
    /// Prompt tokens estimated from the request before it was sent.
    pub prompt_tokens: u64,
    pub response_id: Option<String>,
    pub output_text: String,
    pub message_start_sent: bool,
    pub usage: UsageCounter,
    pub builtin_tool_calls: BTreeMap<String, u64>,
    pub malformed_frames: u64,
    pub phase: StreamPhase,
}

impl ConversionContext {
    pub fn new(original: OriginalRequest, upstream_model: impl Into<String>, prompt_tokens: u64) -> Self {
        Self {
            original,
            upstream_model: upstream_model.into(),
            prompt_tokens,
            response_id: None,
            output_text: String::new(),
            message_start_sent: false,
            usage: UsageCounter::default(),
            builtin_tool_calls: BTreeMap::new(),
            malformed_frames: 0,
            phase: StreamPhase::Idle,
        }
    }

    pub fn converted_from(&self) -> Dialect {
        self.original.dialect()
    }

    /// Count a built-in tool invocation for an output item type.
    /// Returns false when the item type is not a known built-in tool.
    pub fn record_tool_call(&mut self, item_type: &str) -> bool {
        match builtin_tool_for_item(item_type) {
            Some(tool) => {
                *self.builtin_tool_calls.entry(tool.to_string()).or_insert(0) += 1;
                true
            }
            None => false,
        }
    }
}
