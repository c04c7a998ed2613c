//! Error types for the bridge.

use crate::translate::messages_types::ErrorResponse;
use crate::translate::Dialect;
use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum BridgeError {
    /// Missing or null request, or a request without a model.
    #[error("Invalid input: {message}")]
    Input { message: String },

    /// A value could not be encoded or decoded while translating.
    #[error("Conversion error: {message}")]
    Conversion {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    /// Structured content carried text that cannot be sanitized without
    /// altering its schema.
    #[error("Encoding error: {message}")]
    Encoding { message: String },

    /// The backend answered with an error object or a non-success status.
    #[error("Upstream error ({status}): {message}")]
    Upstream {
        status: u16,
        kind: String,
        message: String,
    },

    /// The backend body could not be read.
    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl BridgeError {
    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input {
            message: msg.into(),
        }
    }

    pub fn conversion(msg: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Conversion {
            message: msg.into(),
            source: Some(source),
        }
    }

    pub fn encoding(msg: impl Into<String>) -> Self {
        Self::Encoding {
            message: msg.into(),
        }
    }

    pub fn upstream(status: u16, kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Upstream {
            status,
            kind: kind.into(),
            message: msg.into(),
        }
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Whether the error came out of request translation. The router may fall
    /// back to native handling for these; everything else is surfaced.
    pub fn is_translation_failure(&self) -> bool {
        matches!(
            self,
            Self::Input { .. } | Self::Conversion { .. } | Self::Encoding { .. }
        )
    }

    /// HTTP status to answer the caller with. Upstream statuses are preserved.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Input { .. } | Self::Encoding { .. } => 400,
            Self::Upstream { status, .. } => *status,
            Self::Transport { .. } | Self::Http(_) => 502,
            Self::Conversion { .. }
            | Self::Config { .. }
            | Self::Io(_)
            | Self::Json(_)
            | Self::Toml(_) => 500,
        }
    }

    fn error_kind(&self) -> &str {
        match self {
            Self::Input { .. } | Self::Encoding { .. } => "invalid_request_error",
            Self::Upstream { kind, .. } if !kind.is_empty() => kind,
            Self::Upstream { .. } | Self::Transport { .. } | Self::Http(_) => "upstream_error",
            _ => "api_error",
        }
    }

    /// Render the error as a JSON body in the caller's dialect.
    pub fn to_body(&self, dialect: Dialect) -> serde_json::Value {
        let message = match self {
            Self::Upstream { message, .. } => message.clone(),
            other => other.to_string(),
        };

        match dialect {
            Dialect::Messages => serde_json::to_value(ErrorResponse::from_kind(self.error_kind(), message))
                .unwrap_or(serde_json::Value::Null),
            Dialect::Chat | Dialect::Responses => serde_json::json!({
                "error": {
                    "message": message,
                    "type": self.error_kind(),
                }
            }),
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
