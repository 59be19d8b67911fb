//! Codec configuration
//!
//! Each codec takes the section of [`CodecConfig`] it cares about. The
//! configuration is an explicit value passed into every call; nothing in the
//! engine reads ambient or global state.
//!
//! ```toml
//! [wire]
//! max_depth = 128
//! number_policy = "compact"   # or "lossless"
//!
//! [json]
//! max_depth = 128
//! pretty = false
//!
//! [stack]
//! max_depth = 128
//! ```
//!
//! Every section and every field is optional.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Nesting limit applied when a section does not set one
pub const DEFAULT_MAX_DEPTH: usize = 128;

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

/// Errors loading a configuration or registry manifest
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// How the wire codec chooses a representation for non-integral numbers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumberPolicy {
    /// Values within `[-(2^31-1), 2^31-1]` travel as f32 even if that rounds
    #[default]
    Compact,
    /// Take the f32 path only when the value survives it exactly
    Lossless,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WireConfig {
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    pub number_policy: NumberPolicy,
}

impl Default for WireConfig {
    fn default() -> Self {
        WireConfig {
            max_depth: DEFAULT_MAX_DEPTH,
            number_policy: NumberPolicy::Compact,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JsonConfig {
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Indent output
    pub pretty: bool,
}

impl Default for JsonConfig {
    fn default() -> Self {
        JsonConfig {
            max_depth: DEFAULT_MAX_DEPTH,
            pretty: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StackConfig {
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

impl Default for StackConfig {
    fn default() -> Self {
        StackConfig {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Settings for all three codecs
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CodecConfig {
    pub wire: WireConfig,
    pub json: JsonConfig,
    pub stack: StackConfig,
}

impl CodecConfig {
    /// Parse and validate a TOML document
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: CodecConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&content)?;
        tracing::debug!("Loaded codec configuration from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (section, depth) in [
            ("wire", self.wire.max_depth),
            ("json", self.json.max_depth),
            ("stack", self.stack.max_depth),
        ] {
            if depth == 0 {
                return Err(ConfigError::Invalid(format!(
                    "[{}] max_depth must be at least 1",
                    section
                )));
            }
        }
        Ok(())
    }
}
