use serde::{Deserialize, Serialize};

/// Container extensions fetched with a single streamed GET.
pub const DIRECT_EXTENSIONS: &[&str] = &[
    "mp4", "webm", "mov", "mkv", "m4v", "mp3", "m4a", "ogg", "avi", "flv", "ts", "wav", "3gp",
];

/// HLS playlist extension handed to the external downloader.
pub const MANIFEST_EXTENSION: &str = "m3u8";

/// What a URL points at, judged by its path extension only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    File,
    Manifest,
    Unknown,
}

/// Classify a URL by the extension of its path. Query and fragment are ignored.
pub fn classify(url: &str) -> MediaKind {
    match path_extension(url) {
        Some(ext) if is_direct_extension(&ext) => MediaKind::File,
        Some(ext) if ext == MANIFEST_EXTENSION => MediaKind::Manifest,
        _ => MediaKind::Unknown,
    }
}

/// Like [`classify`], but honours a sniffed resource-type hint: a request the
/// browser tagged as `media` counts as a direct file.
pub fn classify_observed(url: &str, resource_type: Option<&str>) -> MediaKind {
    match classify(url) {
        MediaKind::Unknown if is_media_resource_type(resource_type) => MediaKind::File,
        kind => kind,
    }
}

pub(crate) fn is_media_resource_type(resource_type: Option<&str>) -> bool {
    resource_type.is_some_and(|t| t.trim().eq_ignore_ascii_case("media"))
}

pub(crate) fn is_direct_extension(ext: &str) -> bool {
    DIRECT_EXTENSIONS.contains(&ext)
}

/// Lowercased extension of the last path segment, without query or fragment.
pub(crate) fn path_extension(url: &str) -> Option<String> {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    let path = &url[..end];
    let segment = path.rsplit('/').next().unwrap_or(path);
    let (_, ext) = segment.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
