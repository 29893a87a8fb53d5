use serde::{Deserialize, Serialize};

use crate::MediaKind;

/// A media URL discovered in a page, with the referer needed to fetch it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaCandidate {
    pub url: String,
    pub kind: MediaKind,
    pub referer: String,
}

impl MediaCandidate {
    pub fn new(url: impl Into<String>, kind: MediaKind, referer: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind,
            referer: referer.into(),
        }
    }
}

/// Drop later duplicates (exact URL match), keeping first-seen order.
pub fn dedupe_candidates(candidates: Vec<MediaCandidate>) -> Vec<MediaCandidate> {
    let mut seen = std::collections::HashSet::new();
    candidates
        .into_iter()
        .filter(|candidate| seen.insert(candidate.url.clone()))
        .collect()
}
