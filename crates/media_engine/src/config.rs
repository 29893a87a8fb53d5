use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::delegated::DownloaderSettings;
use crate::fetch::FetchSettings;

/// Everything the orchestrator needs to run transfers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub download_dir: PathBuf,
    pub fetch: FetchSettings,
    pub downloader: DownloaderSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("downloads"),
            fetch: FetchSettings::default(),
            downloader: DownloaderSettings::default(),
        }
    }
}

impl EngineConfig {
    pub fn default_with_output(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            download_dir: download_dir.into(),
            ..Self::default()
        }
    }
}
