use std::sync::Arc;

use engine_logging::{engine_info, engine_warn};
use media_core::{
    destination_file_name, plan, select_candidate, MediaCandidate, Plan, RetrievalRequest,
    Selection, Strategy, TransferJob, TransferPlan,
};

use crate::broadcast::ProgressBroadcaster;
use crate::config::EngineConfig;
use crate::delegated::DelegatedTransfer;
use crate::direct::DirectTransfer;
use crate::extract::{CandidateExtractor, ExtractionContext};
use crate::fetch::{PageFetcher, ReqwestPageFetcher};
use crate::persist::prepare_output_dir;
use crate::process::{ProcessRunner, TokioProcessRunner};
use crate::{FetchError, TransferError, TransferFailure, TransferReport};

/// How one retrieval ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrievalOutcome {
    Transferred(TransferReport),
    TransferFailed(TransferFailure),
    /// Extraction ran and found nothing usable.
    NoCandidates,
    /// The best candidate is neither a direct file nor a manifest.
    Unsupported(MediaCandidate),
    /// Scanning failed where no fallback applies.
    ExtractionFailed(FetchError),
}

impl RetrievalOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RetrievalOutcome::Transferred(_))
    }
}

/// Runs a request end to end: dispatch, optional extraction, one transfer.
pub struct Orchestrator {
    config: EngineConfig,
    extractor: CandidateExtractor,
    direct: DirectTransfer,
    delegated: DelegatedTransfer,
}

impl Orchestrator {
    pub fn new(config: EngineConfig, broadcaster: ProgressBroadcaster) -> Self {
        let fetcher = Arc::new(ReqwestPageFetcher::new(config.fetch.clone()));
        Self::with_components(config, fetcher, Arc::new(TokioProcessRunner), broadcaster)
    }

    pub fn with_components(
        config: EngineConfig,
        fetcher: Arc<dyn PageFetcher>,
        runner: Arc<dyn ProcessRunner>,
        broadcaster: ProgressBroadcaster,
    ) -> Self {
        Self {
            extractor: CandidateExtractor::new(fetcher),
            direct: DirectTransfer::new(config.fetch.clone(), broadcaster.clone()),
            delegated: DelegatedTransfer::new(runner, config.downloader.clone(), broadcaster),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn retrieve(&self, request: &RetrievalRequest) -> RetrievalOutcome {
        let file_name = destination_file_name(request.file_name.as_deref(), &request.input);
        engine_info!(
            "retrieve mode={} file={} input_len={}",
            request.mode,
            file_name,
            request.input.len()
        );

        let transfer = match plan(request) {
            Plan::Transfer(transfer) => transfer,
            Plan::Extract(extract) => {
                let best_effort = extract.best_effort;
                let candidates = match self.extractor.extract(ExtractionContext::from(extract)).await {
                    Ok(candidates) => candidates,
                    Err(err) if best_effort => {
                        engine_warn!("page scan failed, treating as no media: {}", err);
                        Vec::new()
                    }
                    Err(err) => {
                        engine_warn!("page scan failed: {}", err);
                        return RetrievalOutcome::ExtractionFailed(err);
                    }
                };
                engine_info!("extraction found {} candidate(s)", candidates.len());
                match select_candidate(&candidates) {
                    None => return RetrievalOutcome::NoCandidates,
                    Some(Selection::Unsupported(candidate)) => {
                        engine_info!("best candidate is unsupported: {}", candidate.url);
                        return RetrievalOutcome::Unsupported(candidate);
                    }
                    Some(Selection::Transfer(transfer)) => transfer,
                }
            }
        };

        self.run_transfer(transfer, &file_name).await
    }

    async fn run_transfer(&self, transfer: TransferPlan, file_name: &str) -> RetrievalOutcome {
        if let Err(err) = prepare_output_dir(&self.config.download_dir).await {
            return RetrievalOutcome::TransferFailed(TransferFailure {
                strategy: transfer.strategy,
                error: TransferError::Io(err.to_string()),
                referer: transfer.referer,
                log: Vec::new(),
            });
        }

        let job = transfer.into_job(self.config.download_dir.join(file_name));
        match self.execute(&job).await {
            Ok(report) => RetrievalOutcome::Transferred(report),
            Err(failure) => RetrievalOutcome::TransferFailed(failure),
        }
    }

    async fn execute(&self, job: &TransferJob) -> Result<TransferReport, TransferFailure> {
        match job.strategy {
            Strategy::Direct => self.direct.transfer(&job.source_url, &job.destination).await,
            Strategy::Delegated => {
                self.delegated
                    .transfer(&job.source_url, &job.destination, job.referer.as_deref())
                    .await
            }
        }
    }
}
