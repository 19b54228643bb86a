//! Configuration management for the audio session bridge.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/audio-bridge/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("workers must be between 1 and 64, got {0}")]
    InvalidWorkers(usize),

    #[error("queue_capacity must be between 1 and 1000000, got {0}")]
    InvalidQueueCapacity(usize),

    #[error("thread_name must not be empty")]
    EmptyThreadName,

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Upper bound for the fan-out worker pool.
const MAX_WORKERS: usize = 64;

/// Upper bound for pending events per registry.
const MAX_QUEUE_CAPACITY: usize = 1_000_000;

/// Main configuration structure for the audio session bridge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Logging configuration.
    pub logging: LoggingConfig,

    /// Confinement thread configuration.
    pub confinement: ConfinementConfig,

    /// Fan-out dispatcher configuration.
    pub dispatch: DispatchConfig,

    /// Volume handling configuration.
    pub volume: VolumeConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,
}

/// Confinement thread configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConfinementConfig {
    /// Name given to the OS thread that owns every native call.
    pub thread_name: String,
}

/// What to do when a registry's pending-event queue is full.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Discard the oldest pending event to make room.
    DropOldest,
    /// Never discard; the queue grows without bound.
    Unbounded,
}

/// Fan-out dispatcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DispatchConfig {
    /// Number of threads delivering notifications.
    pub workers: usize,

    /// Maximum pending events per registry.
    pub queue_capacity: usize,

    /// Behaviour when `queue_capacity` is reached.
    pub overflow: OverflowPolicy,
}

/// How out-of-range volume requests are handled.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VolumePolicy {
    /// Clamp into 0..=100.
    Clamp,
    /// Fail with `AudioError::VolumeOutOfRange`.
    Reject,
}

/// Volume handling configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VolumeConfig {
    /// Policy for `set_volume` arguments outside 0..=100.
    pub policy: VolumePolicy,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Default for ConfinementConfig {
    fn default() -> Self {
        Self {
            thread_name: "audio-confinement".to_string(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            queue_capacity: 1024,
            overflow: OverflowPolicy::DropOldest,
        }
    }
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            policy: VolumePolicy::Clamp,
        }
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("audio-bridge")
        .join("config.toml")
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - AUDIO_BRIDGE_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    /// - AUDIO_BRIDGE_FANOUT_WORKERS: Override the fan-out worker count
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("AUDIO_BRIDGE_LOG_LEVEL") {
            if !level.is_empty() {
                tracing::info!("Overriding log_level from environment: {}", level);
                self.logging.log_level = level;
            }
        }

        if let Ok(workers) = std::env::var("AUDIO_BRIDGE_FANOUT_WORKERS") {
            if !workers.is_empty() {
                match workers.parse::<usize>() {
                    Ok(n) => {
                        tracing::info!("Overriding dispatch.workers from environment: {}", n);
                        self.dispatch.workers = n;
                    }
                    Err(e) => {
                        tracing::warn!(
                            value = %workers,
                            error = %e,
                            "Ignoring invalid AUDIO_BRIDGE_FANOUT_WORKERS"
                        );
                    }
                }
            }
        }
    }

    /// Validate the configuration values.
    ///
    /// Returns an error if any configuration value is outside the valid range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dispatch.workers < 1 || self.dispatch.workers > MAX_WORKERS {
            return Err(ConfigError::InvalidWorkers(self.dispatch.workers));
        }

        if self.dispatch.queue_capacity < 1 || self.dispatch.queue_capacity > MAX_QUEUE_CAPACITY {
            return Err(ConfigError::InvalidQueueCapacity(
                self.dispatch.queue_capacity,
            ));
        }

        if self.confinement.thread_name.trim().is_empty() {
            return Err(ConfigError::EmptyThreadName);
        }

        let level = self.logging.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(
                self.logging.log_level.clone(),
            ));
        }

        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// If the file exists but is invalid TOML, returns an error with
    /// a helpful message.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}
