use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use engine_logging::{engine_info, engine_warn};
use media_core::Strategy;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::broadcast::{ProgressBroadcaster, ProgressEvent};
use crate::process::{LineSink, OutputLine, ProcessInvocation, ProcessRunner};
use crate::{TransferError, TransferFailure, TransferReport, TransferResult};

/// `12.6%` in a yt-dlp progress line.
static PERCENT: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"(\d{1,3}\.\d)%").ok());

/// How the external downloader is invoked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloaderSettings {
    pub program: String,
    pub user_agent: String,
    pub concurrent_fragments: u32,
    pub fragment_retries: u32,
    pub retries: u32,
    /// Cap on distinct outputs from one invocation (playlists).
    pub max_downloads: u32,
    pub working_dir: Option<PathBuf>,
}

impl Default for DownloaderSettings {
    fn default() -> Self {
        Self {
            program: "yt-dlp".to_string(),
            user_agent: "Mozilla/5.0".to_string(),
            concurrent_fragments: 8,
            fragment_retries: 15,
            retries: 15,
            max_downloads: 3,
            working_dir: None,
        }
    }
}

impl DownloaderSettings {
    pub fn invocation(&self, source_url: &str, destination: &Path, referer: &str) -> ProcessInvocation {
        let args = vec![
            "--newline".to_string(),
            "--add-header".to_string(),
            format!("Referer:{referer}"),
            "--add-header".to_string(),
            format!("User-Agent:{}", self.user_agent),
            "--concurrent-fragments".to_string(),
            self.concurrent_fragments.to_string(),
            "--fragment-retries".to_string(),
            self.fragment_retries.to_string(),
            "--retries".to_string(),
            self.retries.to_string(),
            "--max-downloads".to_string(),
            self.max_downloads.to_string(),
            "-o".to_string(),
            destination.display().to_string(),
            source_url.to_string(),
        ];
        ProcessInvocation {
            program: self.program.clone(),
            args,
            working_dir: self.working_dir.clone(),
        }
    }
}

/// Percentage reported in a downloader output line, if any.
pub fn parse_progress(line: &str) -> Option<f64> {
    PERCENT
        .as_ref()?
        .captures(line)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Collects the transfer log and turns progress lines into events.
struct DownloaderOutput<'a> {
    log: Mutex<Vec<String>>,
    broadcaster: &'a ProgressBroadcaster,
}

impl DownloaderOutput<'_> {
    fn into_log(self) -> Vec<String> {
        self.log.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, line: String) {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line);
    }
}

impl LineSink for DownloaderOutput<'_> {
    fn line(&self, line: OutputLine) {
        match line {
            OutputLine::Stdout(text) => {
                let text = text.trim();
                if text.is_empty() {
                    return;
                }
                if let Some(pct) = parse_progress(text) {
                    self.broadcaster.publish(ProgressEvent::percent(pct, None));
                }
                self.push(text.to_string());
            }
            OutputLine::Stderr(text) => {
                let text = text.trim();
                if !text.is_empty() {
                    self.push(text.to_string());
                }
            }
        }
    }
}

/// Transfer handed to an external downloader process.
pub struct DelegatedTransfer {
    runner: Arc<dyn ProcessRunner>,
    settings: DownloaderSettings,
    broadcaster: ProgressBroadcaster,
}

impl DelegatedTransfer {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        settings: DownloaderSettings,
        broadcaster: ProgressBroadcaster,
    ) -> Self {
        Self {
            runner,
            settings,
            broadcaster,
        }
    }

    /// Run the downloader. The referer defaults to the source URL itself.
    ///
    /// A terminal `100 / done` event is published whatever the outcome, so
    /// observers waiting on completion are released.
    pub async fn transfer(
        &self,
        source_url: &str,
        destination: &Path,
        referer: Option<&str>,
    ) -> TransferResult {
        let referer = referer.unwrap_or(source_url).to_string();
        engine_info!(
            "delegated transfer url={} file={:?} referer={}",
            source_url,
            destination,
            referer
        );

        let invocation = self.settings.invocation(source_url, destination, &referer);
        let output = DownloaderOutput {
            log: Mutex::new(vec![
                "yt-dlp download".to_string(),
                format!("URL: {source_url}"),
                format!("Referer: {referer}"),
            ]),
            broadcaster: &self.broadcaster,
        };

        let exit = self.runner.run(&invocation, &output).await;
        self.broadcaster.publish(ProgressEvent::done());
        let mut log = output.into_log();

        let error = match exit {
            Ok(exit) if exit.success() => {
                log.push("yt-dlp download complete".to_string());
                engine_info!("delegated transfer finished file={:?}", destination);
                return Ok(TransferReport {
                    strategy: Strategy::Delegated,
                    file: destination.to_path_buf(),
                    referer: Some(referer),
                    log,
                });
            }
            Ok(exit) => {
                let code = exit
                    .code
                    .map_or_else(|| "signal".to_string(), |c| c.to_string());
                log.push(format!("yt-dlp failed (code: {code})"));
                TransferError::DownloaderFailed { code: exit.code }
            }
            Err(err) => {
                log.push(err.to_string());
                err
            }
        };

        engine_warn!("delegated transfer failed url={} error={}", source_url, error);
        Err(TransferFailure {
            strategy: Strategy::Delegated,
            error,
            referer: Some(referer),
            log,
        })
    }
}
