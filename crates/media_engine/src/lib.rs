//! Media fetch engine: page scanning, transfers and progress fan-out.
mod broadcast;
mod config;
mod decode;
mod delegated;
mod direct;
mod extract;
mod fetch;
mod orchestrator;
mod persist;
mod process;
mod size;
mod types;

pub use broadcast::{
    ProgressBroadcaster, ProgressEvent, SubscriberId, Subscription, DONE_LABEL, SUBSCRIBER_BUFFER,
};
pub use config::EngineConfig;
pub use decode::{decode_page, DecodedPage};
pub use delegated::{parse_progress, DelegatedTransfer, DownloaderSettings};
pub use direct::{DirectTransfer, PercentTracker, WRITE_BUFFER_BYTES};
pub use extract::{
    candidates_from_scan, scan_markup, CandidateExtractor, ExtractionContext, MarkupScan,
    RawMedia, FALLBACK_BASE, MAX_FRAME_DEPTH,
};
pub use fetch::{FetchSettings, PageFetcher, ReqwestPageFetcher, BROWSER_USER_AGENT};
pub use orchestrator::{Orchestrator, RetrievalOutcome};
pub use persist::{ensure_output_dir, prepare_output_dir, PersistError};
pub use process::{
    locate_downloader, LineSink, OutputLine, ProcessExit, ProcessInvocation, ProcessRunner,
    TokioProcessRunner,
};
pub use size::format_bytes;
pub use types::{
    FailureKind, FetchError, FetchedPage, TransferError, TransferFailure, TransferReport,
    TransferResult,
};
