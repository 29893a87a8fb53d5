use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{classify_observed, looks_like_markup, MediaCandidate, MediaKind, Mode, RetrievalRequest};

/// Transfer strategy. Serialized with the mode names the API reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strategy {
    #[serde(rename = "direct")]
    Direct,
    #[serde(rename = "ytdlp")]
    Delegated,
}

/// A transfer the dispatcher has decided on, before a destination is chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPlan {
    pub strategy: Strategy,
    pub url: String,
    pub referer: Option<String>,
}

impl TransferPlan {
    pub fn direct(url: impl Into<String>) -> Self {
        Self {
            strategy: Strategy::Direct,
            url: url.into(),
            referer: None,
        }
    }

    /// Delegated transfers always present a referer; the URL itself stands in
    /// when the caller gave none.
    pub fn delegated(url: impl Into<String>, referer: Option<&str>) -> Self {
        let url = url.into();
        let referer = referer.map(ToOwned::to_owned).unwrap_or_else(|| url.clone());
        Self {
            strategy: Strategy::Delegated,
            url,
            referer: Some(referer),
        }
    }

    pub fn into_job(self, destination: PathBuf) -> TransferJob {
        TransferJob {
            source_url: self.url,
            destination,
            strategy: self.strategy,
            referer: self.referer,
        }
    }
}

/// One in-flight transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferJob {
    pub source_url: String,
    pub destination: PathBuf,
    pub strategy: Strategy,
    pub referer: Option<String>,
}

/// Page scan needed before a transfer can be chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractPlan {
    pub source: String,
    pub html_override: Option<String>,
    pub referer: Option<String>,
    /// A page fetch failure is reported as "nothing found" rather than an
    /// error. Set for URL input; pasted markup is scanned without fetching.
    pub best_effort: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    Transfer(TransferPlan),
    Extract(ExtractPlan),
}

/// Decide how a request is served, without any I/O.
///
/// Pasted markup always goes to extraction. Otherwise a forcing hint wins when
/// the URL type is compatible with it, `auto` follows the URL type, and every
/// remaining case falls back to scanning the page.
pub fn plan(request: &RetrievalRequest) -> Plan {
    let input = request.input.as_str();
    let referer = request.referer.as_deref();

    if looks_like_markup(input) {
        return Plan::Extract(ExtractPlan {
            source: input.to_string(),
            html_override: Some(input.to_string()),
            referer: request.referer.clone(),
            best_effort: false,
        });
    }

    let kind = classify_observed(input, request.resource_type.as_deref());
    match (request.mode, kind) {
        (Mode::Direct, MediaKind::File) | (Mode::Auto, MediaKind::File) => {
            return Plan::Transfer(TransferPlan::direct(input));
        }
        (Mode::Ytdlp, MediaKind::Manifest | MediaKind::Unknown)
        | (Mode::Auto, MediaKind::Manifest) => {
            return Plan::Transfer(TransferPlan::delegated(input, referer));
        }
        _ => {}
    }

    Plan::Extract(ExtractPlan {
        source: input.to_string(),
        html_override: None,
        referer: request.referer.clone(),
        best_effort: true,
    })
}

/// What to do with the extractor's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Transfer(TransferPlan),
    Unsupported(MediaCandidate),
}

/// First direct file, else first manifest, else whatever came first.
pub fn pick_candidate(candidates: &[MediaCandidate]) -> Option<&MediaCandidate> {
    candidates
        .iter()
        .find(|c| c.kind == MediaKind::File)
        .or_else(|| candidates.iter().find(|c| c.kind == MediaKind::Manifest))
        .or_else(|| candidates.first())
}

/// Pick a candidate and map it to a transfer. `None` when nothing was found.
pub fn select_candidate(candidates: &[MediaCandidate]) -> Option<Selection> {
    let pick = pick_candidate(candidates)?;
    let selection = match pick.kind {
        MediaKind::File => Selection::Transfer(TransferPlan::direct(&pick.url)),
        MediaKind::Manifest => {
            Selection::Transfer(TransferPlan::delegated(&pick.url, Some(&pick.referer)))
        }
        MediaKind::Unknown => Selection::Unsupported(pick.clone()),
    };
    Some(selection)
}
