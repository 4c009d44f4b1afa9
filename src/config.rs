//! Configuration for hackdriver.
//!
//! # Configuration File
//!
//! The configuration file is located at `~/.hackdriver/config.toml`. Every
//! section and key is optional:
//!
//! ```toml
//! [server]
//! host = "localhost"
//! port = 23
//!
//! [session]
//! username_prefix = "bot"
//! # password = "secret"      # defaults to the username
//! reply_timeout_ms = 2000
//!
//! [retry]
//! max_attempts = 3
//! base_delay_ms = 1000
//!
//! [prompt]
//! safety_limit = 10
//!
//! [orchestrator]
//! max_workers = 8
//! call_timeout_secs = 20
//! launch_delay_ms = 100
//!
//! [transcript]
//! enabled = false
//! dir = "transcripts"
//!
//! [glyphs]
//! skew = 0.2
//! creatures = { min = 0, max = 380 }
//!
//! [logging]
//! level = "info"
//! # file = "/tmp/hackdriver.log"
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::GlyphLayout;
use crate::core::retry::RetryPolicy;
use crate::core::session::{SessionSettings, TranscriptSettings};
use crate::core::transcript::TRANSCRIPT_LIMIT;
use crate::core::transport::{Connector, TcpConnector};
use crate::orchestrator::OrchestratorSettings;
use crate::prompt::DEFAULT_SAFETY_LIMIT;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub screen: ScreenConfig,
    pub session: SessionConfig,
    pub retry: RetryConfig,
    pub prompt: PromptConfig,
    pub orchestrator: OrchestratorConfig,
    pub transcript: TranscriptConfig,
    pub glyphs: GlyphLayout,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 23,
            connect_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenConfig {
    pub cols: u16,
    pub rows: u16,
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self { cols: 80, rows: 24 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub username_prefix: String,
    pub password: Option<String>,
    pub banner_timeout_ms: u64,
    pub reply_timeout_ms: u64,
    pub settle_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            username_prefix: "bot".to_string(),
            password: None,
            banner_timeout_ms: 2000,
            reply_timeout_ms: 2000,
            settle_timeout_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// Keystrokes spent on one run of prompts before giving up
    pub safety_limit: u32,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            safety_limit: DEFAULT_SAFETY_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub max_workers: usize,
    pub call_timeout_secs: u64,
    pub launch_delay_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_workers: 8,
            call_timeout_secs: 20,
            launch_delay_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptConfig {
    pub enabled: bool,
    pub dir: PathBuf,
    pub max_entries: usize,
}

impl Default for TranscriptConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: PathBuf::from("transcripts"),
            max_entries: TRANSCRIPT_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Log to this file instead of stderr
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl Config {
    /// Load `~/.hackdriver/config.toml`, falling back to defaults when it
    /// is missing or unreadable
    pub fn load() -> Self {
        if let Some(path) = Self::get_config_path() {
            if path.exists() {
                if let Ok(config) = Self::load_from(&path) {
                    return config;
                }
            }
        }
        Self::default()
    }

    /// Load a specific file; errors are reported, not swallowed
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Get config file path
    fn get_config_path() -> Option<PathBuf> {
        home_dir().map(|home| home.join(".hackdriver").join("config.toml"))
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(TcpConnector::new(
            self.server.host.clone(),
            self.server.port,
            Duration::from_millis(self.server.connect_timeout_ms),
        ))
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            cols: self.screen.cols,
            rows: self.screen.rows,
            password: self.session.password.clone(),
            banner_timeout: Duration::from_millis(self.session.banner_timeout_ms),
            reply_timeout: Duration::from_millis(self.session.reply_timeout_ms),
            settle_timeout: Duration::from_millis(self.session.settle_timeout_ms),
            retry: RetryPolicy::new(self.retry.max_attempts, Duration::from_millis(self.retry.base_delay_ms)),
            safety_limit: self.prompt.safety_limit,
            transcript: self.transcript.enabled.then(|| TranscriptSettings {
                dir: self.transcript.dir.clone(),
                max_entries: self.transcript.max_entries,
            }),
        }
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            max_workers: self.orchestrator.max_workers,
            call_timeout: Duration::from_secs(self.orchestrator.call_timeout_secs),
            launch_delay: Duration::from_millis(self.orchestrator.launch_delay_ms),
            username_prefix: self.session.username_prefix.clone(),
        }
    }
}

/// Get home directory
pub fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}
