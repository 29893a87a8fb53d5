use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use engine_logging::{engine_info, LogDestination, DEFAULT_LOG_FILE};
use media_engine::EngineConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "media_fetch.ron";
/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "MEDIA_FETCH_CONFIG";
pub const DOWNLOAD_DIR_ENV: &str = "DOWNLOAD_DIR";
pub const BIND_ENV: &str = "MEDIA_FETCH_BIND";
pub const DOWNLOADER_ENV: &str = "MEDIA_FETCH_YTDLP";

const DEFAULT_BIND: &str = "127.0.0.1:3000";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config {path:?}: {message}")]
    Parse { path: PathBuf, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub log_destination: LogDestination,
    pub log_level: String,
    pub log_file: PathBuf,
    pub engine: EngineConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let download_dir = dirs::download_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join("Downloads")))
            .unwrap_or_else(|| PathBuf::from("downloads"));
        Self {
            bind_address: DEFAULT_BIND.to_string(),
            log_destination: LogDestination::Terminal,
            log_level: "info".to_string(),
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
            engine: EngineConfig::default_with_output(download_dir),
        }
    }
}

impl ServerConfig {
    /// Overlay environment-style settings. Blank values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        if let Some(dir) = value(DOWNLOAD_DIR_ENV) {
            self.engine.download_dir = PathBuf::from(dir);
        }
        if let Some(bind) = value(BIND_ENV) {
            self.bind_address = bind;
        }
        if let Some(program) = value(DOWNLOADER_ENV) {
            self.engine.downloader.program = program;
        }
    }
}

/// Load the config file (explicit path, else `media_fetch.ron` when present,
/// else defaults) and apply environment overrides.
pub fn load() -> Result<ServerConfig, ConfigError> {
    let explicit = env::var_os(CONFIG_ENV).map(PathBuf::from);
    let mut config = load_from(explicit.as_deref())?;
    config.apply_overrides(|key| env::var(key).ok());
    Ok(config)
}

/// An explicit path must exist; the default file is optional.
pub fn load_from(path: Option<&Path>) -> Result<ServerConfig, ConfigError> {
    let path = match path {
        Some(path) => path,
        None if Path::new(DEFAULT_CONFIG_FILE).is_file() => Path::new(DEFAULT_CONFIG_FILE),
        None => return Ok(ServerConfig::default()),
    };
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config = ron::from_str(&content).map_err(|err| ConfigError::Parse {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    engine_info!("Loaded config from {:?}", path);
    Ok(config)
}
