//! Engine configuration.
//!
//! Loaded from TOML; every field has a default so an empty document is a
//! valid configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Errors produced while loading a configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Limits and policy for one evaluation session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Iterations allowed per loop before a RangeError; 0 disables the check.
    pub max_loop_iterations: usize,
    /// Nested function calls allowed before a RangeError.
    pub max_call_depth: usize,
    /// Host primitives that fail with "not allowed to call".
    pub banned_functions: Vec<String>,
    /// Scope allocations between collection hints; 0 disables them.
    pub gc_threshold: usize,
    /// Largest length an array may grow to through index or `length` writes.
    pub max_array_length: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_loop_iterations: 1_000_000,
            max_call_depth: 256,
            banned_functions: default_banned_functions(),
            gc_threshold: 1000,
            max_array_length: 1 << 24,
        }
    }
}

fn default_banned_functions() -> Vec<String> {
    ["setTimeout", "setInterval", "setImmediate", "requestAnimationFrame"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl EngineConfig {
    /// Parse a configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_call_depth == 0 {
            return Err(ConfigError::Invalid(
                "max_call_depth must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Check whether a host function is banned.
    pub fn is_banned(&self, name: &str) -> bool {
        self.banned_functions.iter().any(|b| b == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert!(config.is_banned("setTimeout"));
    }

    #[test]
    fn test_partial_document() {
        let config = EngineConfig::from_toml_str(
            "max_loop_iterations = 10\nbanned_functions = [\"fetch\"]\n",
        )
        .unwrap();
        assert_eq!(config.max_loop_iterations, 10);
        assert!(config.is_banned("fetch"));
        assert!(!config.is_banned("setTimeout"));
        assert_eq!(config.max_call_depth, 256);
        assert_eq!(config.max_array_length, 1 << 24);
    }

    #[test]
    fn test_invalid_documents() {
        assert!(matches!(
            EngineConfig::from_toml_str("max_call_depth = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("max_call_depth = \"deep\""),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = EngineConfig::load(Path::new("/nonexistent/bindscript.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
