//! TOML configuration file parsing

use std::fs;
use std::path::Path;
use std::string::String;
use std::format;

use super::LoaderConfig;

/// Failure to load a configuration file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// File could not be read
    IoError,
    /// File is not valid configuration TOML
    ParseError,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::IoError => write!(f, "cannot read configuration file"),
            Self::ParseError => write!(f, "invalid configuration file"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Deserialize a u32 that can be hex (0x...) or decimal
pub(super) fn deserialize_hex_u32<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum HexOrInt {
        Int(u32),
        Str(String),
    }

    match HexOrInt::deserialize(deserializer)? {
        HexOrInt::Int(n) => Ok(n),
        HexOrInt::Str(s) => parse_number(&s).map_err(serde::de::Error::custom),
    }
}

/// Parse a number that can be hex (0x...) or decimal
fn parse_number(s: &str) -> Result<u32, String> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("invalid hex: {}", e))
    } else {
        s.parse().map_err(|e| format!("invalid number: {}", e))
    }
}

impl LoaderConfig {
    /// Load a configuration from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|_| ConfigError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// Parse a configuration from a TOML string
    ///
    /// Missing tables and keys keep their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        ::toml::from_str(content).map_err(|e| {
            log::debug!("config parse error: {}", e);
            ConfigError::ParseError
        })
    }
}
