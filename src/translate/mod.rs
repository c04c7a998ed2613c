//! Translation between the Messages, Chat Completions and Responses dialects.
//!
//! The core of the bridge: converts requests, responses, and streaming events
//! from the caller's dialect to the backend's and back. All translation
//! functions are pure (no I/O); token counting is injected through
//! [`usage::TokenCounter`].

pub mod chat_types;
pub mod content;
pub mod context;
pub mod messages_types;
pub mod normalize;
pub mod request;
pub mod response;
pub mod responses_types;
pub mod streaming;
pub mod usage;

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the three wire dialects the bridge speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// `/v1/messages`: system/user/assistant turns, `stop_reason`.
    Messages,
    /// `/v1/chat/completions`: `choices[].delta`, `finish_reason`.
    Chat,
    /// `/v1/responses`: `input`/`output` items, `status`.
    Responses,
}

impl Dialect {
    pub fn endpoint(self) -> &'static str {
        match self {
            Dialect::Messages => "/v1/messages",
            Dialect::Chat => "/v1/chat/completions",
            Dialect::Responses => "/v1/responses",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Dialect::Messages => "messages",
            Dialect::Chat => "chat",
            Dialect::Responses => "responses",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
