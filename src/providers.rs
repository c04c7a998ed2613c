//! Built-in channel presets for common LLM API providers.
//!
//! Each preset names the base URL, the dialect the channel speaks natively,
//! and the default environment variable for the API key. Users specify a
//! channel name in their config and the preset fills in the details.

use crate::translate::Dialect;

/// Built-in channel presets. Base URLs are host roots; dialect endpoints
/// (`/v1/responses`, ...) are appended to them.
#[derive(Debug, Clone)]
pub struct ChannelPreset {
    pub name: &'static str,
    pub base_url: &'static str,
    pub dialect: Dialect,
    pub default_api_key_env: &'static str,
}

const PRESETS: &[ChannelPreset] = &[
    ChannelPreset {
        name: "openai",
        base_url: "https://api.openai.com",
        dialect: Dialect::Responses,
        default_api_key_env: "OPENAI_API_KEY",
    },
    ChannelPreset {
        name: "azure-openai",
        base_url: "https://models.inference.ai.azure.com",
        dialect: Dialect::Chat,
        default_api_key_env: "AZURE_OPENAI_API_KEY",
    },
    ChannelPreset {
        name: "openrouter",
        base_url: "https://openrouter.ai/api",
        dialect: Dialect::Chat,
        default_api_key_env: "OPENROUTER_API_KEY",
    },
    ChannelPreset {
        name: "fireworks",
        base_url: "https://api.fireworks.ai/inference",
        dialect: Dialect::Chat,
        default_api_key_env: "FIREWORKS_API_KEY",
    },
    ChannelPreset {
        name: "grok",
        base_url: "https://api.x.ai",
        dialect: Dialect::Responses,
        default_api_key_env: "XAI_API_KEY",
    },
    ChannelPreset {
        name: "groq",
        base_url: "https://api.groq.com/openai",
        dialect: Dialect::Chat,
        default_api_key_env: "GROQ_API_KEY",
    },
    ChannelPreset {
        name: "deepseek",
        base_url: "https://api.deepseek.com",
        dialect: Dialect::Chat,
        default_api_key_env: "DEEPSEEK_API_KEY",
    },
    ChannelPreset {
        name: "anthropic",
        base_url: "https://api.anthropic.com",
        dialect: Dialect::Messages,
        default_api_key_env: "ANTHROPIC_API_KEY",
    },
];

impl ChannelPreset {
    #[must_use]
    pub fn from_name(name: &str) -> Option<&'static ChannelPreset> {
        PRESETS.iter().find(|p| p.name == name.to_lowercase())
    }

    #[must_use]
    pub fn all() -> &'static [ChannelPreset] {
        PRESETS
    }
}
