//! Configuration system for adbsift.
//!
//! Resolution order: environment variables → config file → defaults.
//! Command-line flags are applied on top by the binary.
//!
//! Config file location:
//!   1. $ADBSIFT_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/adbsift/config.toml
//!   3. ~/.config/adbsift/config.toml

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::stream::Conversation;

/// Default port of the ADB server on the host.
pub const DEFAULT_SERVER_PORT: u16 = 5037;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiftConfig {
    pub capture: CaptureConfig,
    pub framing: FramingConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Port the ADB server listened on.
    pub server_port: u16,
    /// Port the client connected from. 0 = not set; must come from the CLI.
    pub client_port: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FramingConfig {
    /// Reject messages whose checksum does not match their payload.
    pub validate_checksum: bool,
    /// Stop framing a run at the first header with a wrong magic value.
    pub validate_magic: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Where recovered files go. None = ./extracted-client{C}-server{S}.
    pub dir: Option<PathBuf>,
    /// Write manifest.json next to the recovered files.
    pub manifest: bool,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            server_port: DEFAULT_SERVER_PORT,
            client_port: 0,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: None,
            manifest: true,
        }
    }
}

impl CaptureConfig {
    /// The conversation to analyse, once both ports are known.
    pub fn conversation(&self) -> Option<Conversation> {
        (self.client_port != 0).then(|| Conversation::new(self.server_port, self.client_port))
    }
}

impl OutputConfig {
    /// Output directory for `conversation`, relative to `cwd` by default.
    pub fn resolve_dir(&self, cwd: &Path, conversation: Conversation) -> PathBuf {
        match &self.dir {
            Some(dir) => cwd.join(dir),
            None => cwd.join(format!(
                "extracted-client{}-server{}",
                conversation.client_port, conversation.server_port
            )),
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("adbsift")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("invalid value for {0}: {1:?}")]
    InvalidEnv(&'static str, String),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl SiftConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::file_path())
    }

    /// Load from an explicit file. A missing file means defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))?
        } else {
            SiftConfig::default()
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("ADBSIFT_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Apply ADBSIFT_* overrides, reading variables through `var`.
    fn apply_env_overrides<F>(&mut self, var: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = var("ADBSIFT_CAPTURE__SERVER_PORT") {
            self.capture.server_port = parse_port("ADBSIFT_CAPTURE__SERVER_PORT", v)?;
        }
        if let Some(v) = var("ADBSIFT_CAPTURE__CLIENT_PORT") {
            self.capture.client_port = parse_port("ADBSIFT_CAPTURE__CLIENT_PORT", v)?;
        }
        if let Some(v) = var("ADBSIFT_FRAMING__VALIDATE_CHECKSUM") {
            self.framing.validate_checksum = v == "true" || v == "1";
        }
        if let Some(v) = var("ADBSIFT_FRAMING__VALIDATE_MAGIC") {
            self.framing.validate_magic = v == "true" || v == "1";
        }
        if let Some(v) = var("ADBSIFT_OUTPUT__DIR") {
            self.output.dir = Some(PathBuf::from(v));
        }
        Ok(())
    }
}

fn parse_port(key: &'static str, value: String) -> Result<u16, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidEnv(key, value))
}
