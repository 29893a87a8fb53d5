use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Caller's preference for how the media should be retrieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Auto,
    Direct,
    Ytdlp,
}

impl FromStr for Mode {
    type Err = RequestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(Mode::Auto),
            "direct" => Ok(Mode::Direct),
            "ytdlp" | "yt-dlp" => Ok(Mode::Ytdlp),
            other => Err(RequestError::UnknownMode(other.to_string())),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Auto => write!(f, "auto"),
            Mode::Direct => write!(f, "direct"),
            Mode::Ytdlp => write!(f, "ytdlp"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("url is required")]
    MissingUrl,
    #[error("unknown mode `{0}` (expected auto, direct or ytdlp)")]
    UnknownMode(String),
}

/// Download request as it arrives on the wire; every field is optional so that
/// validation can report what is missing instead of failing to deserialize.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRequestBody {
    pub url: Option<String>,
    pub file_name: Option<String>,
    pub mode: Option<String>,
    pub referer: Option<String>,
    pub resource_type: Option<String>,
}

/// A validated retrieval request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalRequest {
    /// A page URL, a media URL, or a pasted HTML fragment.
    pub input: String,
    pub file_name: Option<String>,
    pub mode: Mode,
    pub referer: Option<String>,
    /// Resource-type hint from the browser's network sniffer (e.g. `media`).
    pub resource_type: Option<String>,
}

impl RetrievalRequest {
    pub fn new(input: impl Into<String>, mode: Mode) -> Self {
        Self {
            input: input.into(),
            file_name: None,
            mode,
            referer: None,
            resource_type: None,
        }
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }

    pub fn with_resource_type(mut self, resource_type: impl Into<String>) -> Self {
        self.resource_type = Some(resource_type.into());
        self
    }
}

impl TryFrom<DownloadRequestBody> for RetrievalRequest {
    type Error = RequestError;

    fn try_from(body: DownloadRequestBody) -> Result<Self, Self::Error> {
        let input = non_blank(body.url).ok_or(RequestError::MissingUrl)?;
        let mode = match body.mode.as_deref() {
            Some(raw) => raw.parse()?,
            None => Mode::Auto,
        };
        Ok(Self {
            input,
            file_name: non_blank(body.file_name),
            mode,
            referer: non_blank(body.referer),
            resource_type: non_blank(body.resource_type),
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
