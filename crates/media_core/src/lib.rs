//! Media fetch core: pure classification, request validation and dispatch
//! decisions. Nothing in here performs I/O.
mod candidate;
mod classify;
mod filename;
mod markup;
mod plan;
mod request;
mod sniff;

pub use candidate::{dedupe_candidates, MediaCandidate};
pub use classify::{classify, classify_observed, MediaKind, DIRECT_EXTENSIONS, MANIFEST_EXTENSION};
pub use filename::{destination_file_name, sanitize_file_name};
pub use markup::{looks_like_markup, MARKUP_MARKERS};
pub use plan::{
    pick_candidate, plan, select_candidate, ExtractPlan, Plan, Selection, Strategy, TransferJob,
    TransferPlan,
};
pub use request::{DownloadRequestBody, Mode, RequestError, RetrievalRequest};
pub use sniff::SniffEvent;
