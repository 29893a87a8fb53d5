use serde::{Deserialize, Serialize};

use crate::classify::{is_direct_extension, is_media_resource_type, path_extension};
use crate::{classify_observed, MediaKind, MANIFEST_EXTENSION};

/// A request observed by the host browser view, posted to `/api/sniff`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SniffEvent {
    pub url: String,
    #[serde(default)]
    pub resource_type: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
}

impl SniffEvent {
    pub fn new(url: impl Into<String>, resource_type: Option<&str>) -> Self {
        Self {
            url: url.into(),
            resource_type: resource_type.map(ToOwned::to_owned),
            method: None,
        }
    }

    /// Whether the host should surface this request as downloadable media.
    /// Broader than [`classify`](crate::classify): DASH manifests and any URL
    /// mentioning `m3u8` are reported too.
    pub fn is_media_request(&self) -> bool {
        if self.url.is_empty() {
            return false;
        }
        let by_extension = path_extension(&self.url).is_some_and(|ext| {
            is_direct_extension(&ext) || ext == MANIFEST_EXTENSION || ext == "mpd"
        });
        by_extension
            || is_media_resource_type(self.resource_type.as_deref())
            || self.url.to_ascii_lowercase().contains(MANIFEST_EXTENSION)
    }

    pub fn kind(&self) -> MediaKind {
        classify_observed(&self.url, self.resource_type.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::SniffEvent;
    use crate::MediaKind;

    #[test]
    fn media_extensions_and_resource_type_are_reported() {
        assert!(SniffEvent::new("https://cdn.example/a.webm", None).is_media_request());
        assert!(SniffEvent::new("https://cdn.example/a.mpd", None).is_media_request());
        assert!(SniffEvent::new("https://cdn.example/blob", Some("media")).is_media_request());
        assert!(
            SniffEvent::new("https://cdn.example/hls?format=m3u8", Some("xhr")).is_media_request()
        );
    }

    #[test]
    fn ordinary_requests_are_ignored() {
        assert!(!SniffEvent::new("https://site.example/app.js", Some("script")).is_media_request());
        assert!(!SniffEvent::new("", Some("media")).is_media_request());
    }

    #[test]
    fn event_deserializes_from_host_shape() {
        let event: SniffEvent = serde_json::from_str(
            r#"{"url":"https://cdn.example/v","resourceType":"media","method":"GET"}"#,
        )
        .unwrap();
        assert_eq!(event.method.as_deref(), Some("GET"));
        assert_eq!(event.kind(), MediaKind::File);
    }
}
