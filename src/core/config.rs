//! # Configuration
//!
//! Centralizes all settings with a clear override hierarchy:
//! defaults → config file → env vars → CLI flags.
//!
//! Config lives at `~/.parley/config.toml`. If missing on first run, a
//! commented-out default is generated so users can discover all options.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::session::{DEFAULT_APOLOGY, SessionOptions};

// ============================================================================
// Config Structs (all fields Option<T> for sparse TOML)
// ============================================================================

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ParleyConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ServerConfig {
    pub base_url: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub connect_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ChatConfig {
    pub apology: Option<String>,
    pub history_enabled: Option<bool>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct SessionsConfig {
    #[serde(default)]
    pub hidden_characters: Vec<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: Option<String>,
    pub file: Option<String>,
}

// ============================================================================
// Defaults
// ============================================================================

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api/v1";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_LOG_FILE: &str = "parley.log";

// ============================================================================
// Resolved Config (concrete values, no Options)
// ============================================================================

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub base_url: String,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub apology: String,
    pub history_enabled: bool,
    pub hidden_characters: Vec<String>,
    pub log_level: log::LevelFilter,
    pub log_file: PathBuf,
    /// Problems found while resolving, for the user to see at startup.
    pub notices: Vec<String>,
}

impl ResolvedConfig {
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            apology: self.apology.clone(),
            history_enabled: self.history_enabled,
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "config I/O error: {e}"),
            ConfigError::Parse(e) => write!(f, "config parse error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Loading
// ============================================================================

/// Where the loaded config came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOrigin {
    File(PathBuf),
    /// No file existed; a commented default was written here.
    Generated(PathBuf),
    /// No file was read or written.
    Defaults,
}

/// Returns the path to `~/.parley/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".parley").join("config.toml"))
}

/// Load config from `~/.parley/config.toml`.
///
/// If the file doesn't exist, generates a commented-out default and
/// returns `ParleyConfig::default()`.
pub fn load_config() -> Result<(ParleyConfig, ConfigOrigin), ConfigError> {
    match config_path() {
        Some(path) => load_config_from(&path),
        None => {
            warn!("Could not determine home directory, using default config");
            Ok((ParleyConfig::default(), ConfigOrigin::Defaults))
        }
    }
}

pub fn load_config_from(path: &Path) -> Result<(ParleyConfig, ConfigOrigin), ConfigError> {
    if !path.exists() {
        info!("No config file found, generating default at {}", path.display());
        let origin = if generate_default_config(path) {
            ConfigOrigin::Generated(path.to_path_buf())
        } else {
            ConfigOrigin::Defaults
        };
        return Ok((ParleyConfig::default(), origin));
    }

    let contents = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let config: ParleyConfig = toml::from_str(&contents).map_err(ConfigError::Parse)?;
    info!("Loaded config from {}", path.display());
    debug!("Config: {:?}", config);
    Ok((config, ConfigOrigin::File(path.to_path_buf())))
}

/// Writes the commented default. Returns whether the file was written.
fn generate_default_config(path: &Path) -> bool {
    let default_content = r#"# Parley Configuration
# All settings are optional; defaults are used for anything not specified.
# Override hierarchy: defaults → this file → env vars → CLI flags.

# [server]
# base_url = "http://localhost:8000/api/v1"   # Or set PARLEY_BASE_URL
# request_timeout_secs = 30                   # history, greeting, save, clear
# connect_timeout_secs = 10                   # streaming replies

# [chat]
# apology = "Sorry, I had trouble responding. Please try again."
# history_enabled = true

# [sessions]
# hidden_characters = ["narrator"]            # never listed by `parley sessions`

# [logging]
# level = "debug"                             # Or set PARLEY_LOG_LEVEL
# file = "parley.log"
"#;

    if let Some(parent) = path.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            warn!("Failed to create config directory: {}", e);
            return false;
        }
    }
    match fs::write(path, default_content) {
        Ok(()) => true,
        Err(e) => {
            warn!("Failed to write default config: {}", e);
            false
        }
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// Resolve the final config by collapsing: defaults → config file → env vars → CLI.
pub fn resolve(config: &ParleyConfig, cli_base_url: Option<&str>) -> ResolvedConfig {
    resolve_with_env(config, cli_base_url, |key| std::env::var(key).ok())
}

fn resolve_with_env(
    config: &ParleyConfig,
    cli_base_url: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> ResolvedConfig {
    // Base URL: CLI → env → config → default
    let base_url = cli_base_url
        .map(str::to_string)
        .or_else(|| env("PARLEY_BASE_URL"))
        .or_else(|| config.server.base_url.clone())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

    let mut notices = Vec::new();

    // Log level: env → config → debug
    let log_level = env("PARLEY_LOG_LEVEL")
        .or_else(|| config.logging.level.clone())
        .and_then(|level| match level.parse::<log::LevelFilter>() {
            Ok(l) => Some(l),
            Err(_) => {
                notices.push(format!("Unknown log level {level:?}, using debug"));
                None
            }
        })
        .unwrap_or(log::LevelFilter::Debug);

    ResolvedConfig {
        base_url,
        request_timeout: Duration::from_secs(
            config
                .server
                .request_timeout_secs
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        ),
        connect_timeout: Duration::from_secs(
            config
                .server
                .connect_timeout_secs
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
        ),
        apology: config
            .chat
            .apology
            .clone()
            .filter(|a| !a.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_APOLOGY.to_string()),
        history_enabled: config.chat.history_enabled.unwrap_or(true),
        hidden_characters: config.sessions.hidden_characters.clone(),
        log_level,
        log_file: PathBuf::from(
            config
                .logging
                .file
                .clone()
                .unwrap_or_else(|| DEFAULT_LOG_FILE.to_string()),
        ),
        notices,
    }
}

/// Messages to show the user once startup has settled.
pub fn startup_notices(origin: &ConfigOrigin, resolved: &ResolvedConfig) -> Vec<String> {
    let mut notices = Vec::new();
    if let ConfigOrigin::Generated(path) = origin {
        notices.push(format!("Wrote a default config to {}", path.display()));
    }
    notices.extend(resolved.notices.iter().cloned());
    notices
}
