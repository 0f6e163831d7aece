//! Configuration file support for notestream
//!
//! Configuration is stored in TOML format at:
//! - Linux: `~/.config/notestream/config.toml`
//! - macOS: `~/Library/Application Support/notestream/config.toml`
//! - Windows: `%APPDATA%\notestream\config.toml`

use crate::error::{Error, Result};
use crate::transport::ReconnectPolicy;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Generation request settings
    pub session: SessionSettings,
    /// Playback settings
    pub playback: PlaybackSettings,
    /// Reconnect backoff
    pub reconnect: ReconnectSettings,
}

impl Config {
    /// Load configuration from the default config file location
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Err(Error::Config(format!("Config file not found at {:?}", path)))
        }
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration or return default if not found
    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(config) => config,
            Err(Error::Config(_)) => Self::default(),
            Err(e) => {
                log::warn!("Ignoring unreadable config: {}", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the default config file location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to a specific file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path
    pub fn config_path() -> Result<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Directory finished compositions are written to
    pub fn gallery_dir() -> Result<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.data_dir().join("gallery"))
    }

    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("", "", "notestream")
            .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))
    }

    /// Create a default config file with comments
    pub fn create_default_config_file() -> Result<PathBuf> {
        let path = Self::config_path()?;
        Self::write_default_config(&path)?;
        Ok(path)
    }

    /// Write the commented default config to `path`
    pub fn write_default_config(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = r#"# notestream configuration file

[session]
# Model and provider forwarded with every compose request
model = "google/gemini-3-flash-preview"
provider = "openrouter"

# Token budget for one composition
max_tokens = 100000

# Preferred instrument bank: "electronic", "acoustic", "orchestral" or "retro"
# Leave unset to let the generator choose.
# bank = "acoustic"

# Keepalive ping interval in seconds
heartbeat_secs = 25

[playback]
# Start playing as soon as the first note arrives
auto_play = true

# Wrap to the beginning when playback reaches the end
loop_playback = false

# Playback tick interval in milliseconds (visual signals, end detection)
tick_ms = 20

[reconnect]
# First reconnect delay in milliseconds
initial_ms = 1000

# Upper bound for the reconnect delay in milliseconds
max_ms = 30000

# Growth factor between attempts
factor = 2.0
"#;

        fs::write(path, content)?;
        Ok(())
    }
}

/// Compose request settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub model: String,
    pub provider: String,
    pub max_tokens: u32,
    /// Bank requested from the generator
    pub bank: Option<String>,
    pub heartbeat_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            model: "google/gemini-3-flash-preview".to_string(),
            provider: "openrouter".to_string(),
            max_tokens: 100_000,
            bank: None,
            heartbeat_secs: 25,
        }
    }
}

impl SessionSettings {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs.max(1))
    }
}

/// Playback settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    pub auto_play: bool,
    pub loop_playback: bool,
    pub tick_ms: u64,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            auto_play: true,
            loop_playback: false,
            tick_ms: 20,
        }
    }
}

impl PlaybackSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }
}

/// Reconnect backoff settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectSettings {
    pub initial_ms: u64,
    pub max_ms: u64,
    pub factor: f64,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            initial_ms: 1000,
            max_ms: 30_000,
            factor: 2.0,
        }
    }
}

impl ReconnectSettings {
    pub fn policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(
            Duration::from_millis(self.initial_ms),
            Duration::from_millis(self.max_ms),
            self.factor,
        )
    }
}
