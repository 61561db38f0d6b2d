//! Proxy configuration
//!
//! Loaded from TOML and overridden by environment variables:
//!
//! ```toml
//! [proxy]
//! safe_mode = false     # no caching of wrappers or plugs, undo disabled
//! rogue_mode = false    # skip the destroyed-node guard
//! timings = false       # trace how long resolution and plug lookup take
//! undo_enabled = true   # ride committed transactions on the host undo queue
//! undo_identity = "my-tool"
//! ```
//!
//! | Variable                  | Field          |
//! |---------------------------|----------------|
//! | `VOID_PROXY_SAFE_MODE`    | `safe_mode`    |
//! | `VOID_PROXY_ROGUE_MODE`   | `rogue_mode`   |
//! | `VOID_PROXY_TIMINGS`      | `timings`      |
//! | `VOID_PROXY_UNDO`         | `undo_enabled` |

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors from configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub safe_mode: bool,
    pub rogue_mode: bool,
    pub timings: bool,
    pub undo_enabled: bool,
    /// Distinguishes undo commands of independent installations on one host
    pub undo_identity: Option<String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            safe_mode: false,
            rogue_mode: false,
            timings: false,
            undo_enabled: true,
            undo_identity: None,
        }
    }
}

/// Raw TOML structure of a config file
#[derive(Debug, Default, Deserialize)]
struct ConfigToml {
    #[serde(default)]
    proxy: ProxyConfig,
}

fn flag(value: &str) -> bool {
    !matches!(value.trim().to_ascii_lowercase().as_str(), "" | "0" | "false" | "no" | "off")
}

impl ProxyConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let raw: ConfigToml = toml::from_str(content)?;
        Ok(raw.proxy)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Defaults overridden by the process environment
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    pub fn with_env(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any variable source
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(value) = lookup("VOID_PROXY_SAFE_MODE") {
            self.safe_mode = flag(&value);
        }
        if let Some(value) = lookup("VOID_PROXY_ROGUE_MODE") {
            self.rogue_mode = flag(&value);
        }
        if let Some(value) = lookup("VOID_PROXY_TIMINGS") {
            self.timings = flag(&value);
        }
        if let Some(value) = lookup("VOID_PROXY_UNDO") {
            self.undo_enabled = flag(&value);
        }
        if self.safe_mode {
            log::info!("Proxy running in safe mode");
        }
        self
    }

    /// Whether the destroyed-node guard is skipped
    pub fn rogue(&self) -> bool {
        self.rogue_mode && !self.safe_mode
    }

    /// Whether wrappers and plug lookups are cached
    pub fn caching(&self) -> bool {
        !self.safe_mode
    }

    pub fn undo(&self) -> bool {
        self.undo_enabled && !self.safe_mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_parse_toml() {
        let config = ProxyConfig::from_toml_str(
            r#"
            [proxy]
            rogue_mode = true
            undo_identity = "rigging"
            "#,
        )
        .unwrap();

        assert!(config.rogue_mode);
        assert!(config.undo_enabled);
        assert_eq!(config.undo_identity.as_deref(), Some("rigging"));
    }

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(ProxyConfig::from_toml_str("").unwrap(), ProxyConfig::default());
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            ProxyConfig::from_toml_str("[proxy]\nsafe_mode = \"maybe\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [("VOID_PROXY_ROGUE_MODE", "1"), ("VOID_PROXY_UNDO", "false")].into();
        let config = ProxyConfig::default().with_overrides(|key| env.get(key).map(|v| v.to_string()));
        assert!(config.rogue());
        assert!(!config.undo());
    }

    #[test]
    fn test_safe_mode_wins() {
        let config = ProxyConfig {
            safe_mode: true,
            rogue_mode: true,
            ..Default::default()
        };
        assert!(!config.rogue());
        assert!(!config.caching());
        assert!(!config.undo());
    }
}
