use crate::error::{BridgeError, Result};
use crate::providers::ChannelPreset;
use crate::translate::Dialect;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    pub channel: ChannelConfig,
    /// Requested model -> upstream model.
    #[serde(default)]
    pub models: HashMap<String, String>,
    #[serde(default)]
    pub smart_routing: SmartRoutingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    /// Dialect the channel speaks natively; defaults to the preset's.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dialect: Option<Dialect>,
}

/// Route Messages requests for selected models through a Responses backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmartRoutingConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub responses_models: Vec<String>,
    #[serde(default = "default_fallback_on_error")]
    pub fallback_on_error: bool,
}

impl Default for SmartRoutingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            responses_models: Vec::new(),
            fallback_on_error: default_fallback_on_error(),
        }
    }
}

impl SmartRoutingConfig {
    /// Whether smart routing claims `model`. Names match exactly.
    pub fn claims(&self, model: &str) -> bool {
        self.enabled && self.responses_models.iter().any(|m| m == model)
    }
}

fn default_port() -> u16 {
    4230
}

fn default_fallback_on_error() -> bool {
    true
}

const FALLBACK_API_KEY_ENV: &str = "API_KEY";

impl BridgeConfig {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BridgeError::config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Search standard locations for a config file.
    /// Priority: CLI arg > CWD > XDG config > home dir
    pub fn find_and_load(explicit_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit_path {
            return Self::load(path);
        }

        let candidates = config_search_paths();
        for candidate in &candidates {
            if candidate.exists() {
                tracing::info!(path = %candidate.display(), "Loading config");
                return Self::load(candidate);
            }
        }

        Err(BridgeError::config(format!(
            "No config file found. Searched: {}. Create one from config.example.toml",
            candidates
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )))
    }

    fn preset(&self) -> Option<&'static ChannelPreset> {
        ChannelPreset::from_name(&self.channel.name)
    }

    /// Resolve the effective base URL (config override or channel preset default)
    pub fn effective_base_url(&self) -> Result<String> {
        if let Some(ref url) = self.channel.base_url {
            return Ok(url.trim_end_matches('/').to_string());
        }

        let preset = self.preset().ok_or_else(|| {
            BridgeError::config(format!(
                "Unknown channel '{}' and no base_url configured. Known channels: {}",
                self.channel.name,
                known_channels()
            ))
        })?;

        Ok(preset.base_url.to_string())
    }

    /// Resolve the dialect the channel serves natively.
    pub fn channel_dialect(&self) -> Result<Dialect> {
        if let Some(dialect) = self.channel.dialect {
            return Ok(dialect);
        }

        self.preset().map(|p| p.dialect).ok_or_else(|| {
            BridgeError::config(format!(
                "Unknown channel '{}' and no dialect configured. Known channels: {}",
                self.channel.name,
                known_channels()
            ))
        })
    }

    pub fn api_key_env(&self) -> &str {
        self.channel
            .api_key_env
            .as_deref()
            .or_else(|| self.preset().map(|p| p.default_api_key_env))
            .unwrap_or(FALLBACK_API_KEY_ENV)
    }

    /// Resolve the API key from the configured environment variable
    pub fn resolve_api_key(&self) -> Result<String> {
        let var = self.api_key_env();
        std::env::var(var).map_err(|_| {
            BridgeError::config(format!(
                "Environment variable '{}' not set. Set it with your channel API key.",
                var
            ))
        })
    }

    /// Check that everything the server needs at request time resolves.
    pub fn validate(&self) -> Result<()> {
        self.effective_base_url()?;
        self.channel_dialect()?;
        Ok(())
    }
}

fn known_channels() -> String {
    ChannelPreset::all()
        .iter()
        .map(|p| p.name)
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    // CWD
    paths.push(PathBuf::from("responses-bridge.toml"));

    // XDG / platform config dir
    if cfg!(target_os = "macos") {
        if let Some(home) = dirs_path() {
            paths.push(
                home.join("Library")
                    .join("Application Support")
                    .join("responses-bridge")
                    .join("config.toml"),
            );
        }
    } else {
        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
            paths.push(
                PathBuf::from(xdg)
                    .join("responses-bridge")
                    .join("config.toml"),
            );
        }
        if let Some(home) = dirs_path() {
            paths.push(
                home.join(".config")
                    .join("responses-bridge")
                    .join("config.toml"),
            );
        }
    }

    // Home directory fallback
    if let Some(home) = dirs_path() {
        paths.push(home.join(".responses-bridge.toml"));
    }

    paths
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn channel(name: &str) -> ChannelConfig {
        ChannelConfig {
            name: name.to_string(),
            base_url: None,
            api_key_env: None,
            dialect: None,
        }
    }

    fn config_with(channel: ChannelConfig) -> BridgeConfig {
        BridgeConfig {
            port: 4230,
            channel,
            models: HashMap::new(),
            smart_routing: SmartRoutingConfig::default(),
        }
    }

    #[test]
    fn test_load_config() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(
            f,
            r#"
port = 5000

[channel]
name = "anthropic"
api_key_env = "MY_ANTHROPIC_KEY"

[models]
"claude-3-opus" = "gpt-5"

[smart_routing]
enabled = true
responses_models = ["claude-3-opus", "claude-3-haiku"]
"#
        )
        .unwrap();

        let config = BridgeConfig::load(f.path()).unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.channel.name, "anthropic");
        assert_eq!(config.api_key_env(), "MY_ANTHROPIC_KEY");
        assert_eq!(config.channel_dialect().unwrap(), Dialect::Messages);
        assert_eq!(config.models.get("claude-3-opus").map(String::as_str), Some("gpt-5"));
        assert!(!config.models.contains_key("claude-3-haiku"));
        assert!(config.smart_routing.claims("claude-3-haiku"));
        assert!(!config.smart_routing.claims("claude-3.5-sonnet"));
        assert!(config.smart_routing.fallback_on_error);
    }

    #[test]
    fn test_minimal_config_defaults() {
        let config: BridgeConfig = toml::from_str("[channel]\nname = \"openai\"\n").unwrap();
        assert_eq!(config.port, 4230);
        assert!(!config.smart_routing.enabled);
        assert!(config.smart_routing.fallback_on_error);
        assert_eq!(config.api_key_env(), "OPENAI_API_KEY");
    }

    #[test]
    fn test_effective_base_url_from_preset() {
        let config = config_with(channel("openai"));
        assert_eq!(config.effective_base_url().unwrap(), "https://api.openai.com");
        assert_eq!(config.channel_dialect().unwrap(), Dialect::Responses);
    }

    #[test]
    fn test_effective_base_url_override() {
        let config = config_with(ChannelConfig {
            name: "custom".to_string(),
            base_url: Some("https://my-server.com/".to_string()),
            api_key_env: Some("MY_KEY".to_string()),
            dialect: Some(Dialect::Responses),
        });
        assert_eq!(config.effective_base_url().unwrap(), "https://my-server.com");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_channel_without_overrides_is_rejected() {
        let config = config_with(channel("custom"));
        assert!(matches!(
            config.validate().unwrap_err(),
            BridgeError::Config { .. }
        ));
        assert_eq!(config.api_key_env(), "API_KEY");
    }

    #[test]
    fn test_disabled_smart_routing_claims_nothing() {
        let routing = SmartRoutingConfig {
            enabled: false,
            responses_models: vec!["claude-3-opus".to_string()],
            fallback_on_error: true,
        };
        assert!(!routing.claims("claude-3-opus"));
    }
}
