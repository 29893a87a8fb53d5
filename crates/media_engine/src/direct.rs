use std::path::Path;

use engine_logging::{engine_info, engine_warn};
use futures_util::StreamExt;
use media_core::Strategy;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::broadcast::{ProgressBroadcaster, ProgressEvent};
use crate::fetch::FetchSettings;
use crate::size::format_bytes;
use crate::{TransferError, TransferFailure, TransferReport, TransferResult};

/// Write buffer for media bodies; sized for throughput.
pub const WRITE_BUFFER_BYTES: usize = 8 * 1024 * 1024;

/// Integer percentage that only reports changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PercentTracker {
    total: Option<u64>,
    received: u64,
    last: Option<u64>,
}

impl PercentTracker {
    /// A zero or missing total disables percentages entirely.
    pub fn new(total: Option<u64>) -> Self {
        Self {
            total: total.filter(|t| *t > 0),
            received: 0,
            last: None,
        }
    }

    /// Account for `bytes` more; returns the new percentage if it changed.
    pub fn advance(&mut self, bytes: u64) -> Option<u64> {
        self.received += bytes;
        let total = self.total?;
        let pct = ((u128::from(self.received) * 100) / u128::from(total)).min(100) as u64;
        if self.last == Some(pct) {
            return None;
        }
        self.last = Some(pct);
        Some(pct)
    }

    pub fn received(&self) -> u64 {
        self.received
    }
}

/// Single streamed GET written straight to disk.
pub struct DirectTransfer {
    settings: FetchSettings,
    broadcaster: ProgressBroadcaster,
}

impl DirectTransfer {
    pub fn new(settings: FetchSettings, broadcaster: ProgressBroadcaster) -> Self {
        Self {
            settings,
            broadcaster,
        }
    }

    pub async fn transfer(&self, source_url: &str, destination: &Path) -> TransferResult {
        let mut log = Vec::new();
        match self.run(source_url, destination, &mut log).await {
            Ok(()) => {
                self.broadcaster.publish(ProgressEvent::done());
                log.push("Direct download complete".to_string());
                engine_info!("direct transfer finished file={:?}", destination);
                Ok(TransferReport {
                    strategy: Strategy::Direct,
                    file: destination.to_path_buf(),
                    referer: None,
                    log,
                })
            }
            Err(error) => {
                engine_warn!("direct transfer failed url={} error={}", source_url, error);
                Err(TransferFailure {
                    strategy: Strategy::Direct,
                    error,
                    referer: None,
                    log,
                })
            }
        }
    }

    async fn run(
        &self,
        source_url: &str,
        destination: &Path,
        log: &mut Vec<String>,
    ) -> Result<(), TransferError> {
        engine_info!("direct transfer url={} file={:?}", source_url, destination);
        let url = reqwest::Url::parse(source_url)
            .map_err(|err| TransferError::InvalidUrl(err.to_string()))?;
        let client = self
            .settings
            .client_builder()
            .build()
            .map_err(|err| TransferError::Network(err.to_string()))?;

        let response = client
            .get(url)
            .send()
            .await
            .map_err(|err| TransferError::Network(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransferError::HttpStatus(status.as_u16()));
        }

        let total = response.content_length().filter(|len| *len > 0);
        let size_label = total.map(format_bytes).unwrap_or_default();

        log.push("Direct download started".to_string());
        log.push(format!("URL: {source_url}"));
        log.push(format!("File: {}", destination.display()));
        if total.is_some() {
            log.push(format!("Size: {size_label}"));
        }

        let file = File::create(destination).await?;
        let mut writer = BufWriter::with_capacity(WRITE_BUFFER_BYTES, file);
        let mut tracker = PercentTracker::new(total);
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|err| TransferError::Network(err.to_string()))?;
            writer.write_all(&chunk).await?;
            if let Some(pct) = tracker.advance(chunk.len() as u64) {
                log.push(format!("Downloading... {pct}%"));
                self.broadcaster.publish(ProgressEvent::percent(
                    pct as f64,
                    Some(size_label.clone()),
                ));
            }
        }
        writer.flush().await?;
        writer.into_inner().sync_all().await?;
        engine_info!(
            "direct transfer wrote {} bytes to {:?}",
            tracker.received(),
            destination
        );
        Ok(())
    }
}
