//! Configuration system for Mosaic.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $MOSAIC_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/mosaic/config.toml
//!   3. ~/.config/mosaic/config.toml

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MosaicConfig {
    pub listener: ListenerConfig,
    pub reassembly: ReassemblyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// UDP address fragments arrive on.
    pub bind_addr: SocketAddr,
    /// Number of receive workers sharing the socket.
    pub workers: usize,
    /// SO_RCVBUF size. 0 = OS default.
    pub recv_buffer_bytes: usize,
    /// Pending error reports before new ones are dropped.
    pub error_queue: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReassemblyConfig {
    /// How long after its first fragment an incomplete transaction is
    /// abandoned and its holes reported.
    pub cleanup_delay_ms: u64,
}

impl ReassemblyConfig {
    pub fn cleanup_delay(&self) -> Duration {
        Duration::from_millis(self.cleanup_delay_ms)
    }
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for MosaicConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            reassembly: ReassemblyConfig::default(),
        }
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 6789)),
            workers: 4,
            recv_buffer_bytes: 0,
            error_queue: 100,
        }
    }
}

impl Default for ReassemblyConfig {
    fn default() -> Self {
        Self {
            cleanup_delay_ms: 30_000,
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("mosaic")
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
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl MosaicConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::file_path())
    }

    /// Load from an explicit path, then apply env overrides.
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
            Self::parse(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))?
        } else {
            MosaicConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse TOML text. Missing sections and keys fall back to defaults.
    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("MOSAIC_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&MosaicConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply MOSAIC_* env var overrides. Unparseable values are ignored.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(addr) = lookup("MOSAIC_LISTENER__BIND_ADDR").and_then(|v| v.parse().ok()) {
            self.listener.bind_addr = addr;
        }
        if let Some(n) = lookup("MOSAIC_LISTENER__WORKERS").and_then(|v| v.parse().ok()) {
            self.listener.workers = n;
        }
        if let Some(n) = lookup("MOSAIC_LISTENER__RECV_BUFFER_BYTES").and_then(|v| v.parse().ok())
        {
            self.listener.recv_buffer_bytes = n;
        }
        if let Some(ms) =
            lookup("MOSAIC_REASSEMBLY__CLEANUP_DELAY_MS").and_then(|v| v.parse().ok())
        {
            self.reassembly.cleanup_delay_ms = ms;
        }
    }
}
