use std::sync::Arc;

use engine_logging::{engine_debug, engine_info, engine_warn};
use futures_util::future::BoxFuture;
use media_core::{
    classify, dedupe_candidates, looks_like_markup, ExtractPlan, MediaCandidate, MediaKind,
};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

use crate::fetch::PageFetcher;
use crate::FetchError;

/// Frames nested deeper than this are never fetched.
pub const MAX_FRAME_DEPTH: usize = 2;

/// Base used for pasted markup when the caller gave no referer.
pub const FALLBACK_BASE: &str = "https://dummy.local/";

const HLS_TYPE_MARKERS: &[&str] = &[
    "application/vnd.apple.mpegurl",
    "application/x-mpegurl",
    "mpegurl",
    "m3u8",
];

static SCRIPT_MEDIA_URL: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(
        r#"(?i)https?://[^\s"'<>]+?\.(?:mp4|webm|mov|mkv|m4v|mp3|m4a|ogg|avi|flv|ts|wav|3gp|m3u8)[^\s"'<>]*"#,
    )
    .ok()
});

/// One extraction call: a page URL or markup, at some frame depth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionContext {
    pub source: String,
    pub depth: usize,
    pub html_override: Option<String>,
    pub referer: Option<String>,
}

impl ExtractionContext {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            depth: 0,
            html_override: None,
            referer: None,
        }
    }

    pub fn with_html_override(mut self, html: impl Into<String>) -> Self {
        self.html_override = Some(html.into());
        self
    }

    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }

    fn nested(&self, frame_url: String, referer: Option<String>) -> Self {
        Self {
            source: frame_url,
            depth: self.depth + 1,
            html_override: None,
            referer,
        }
    }
}

impl From<ExtractPlan> for ExtractionContext {
    fn from(plan: ExtractPlan) -> Self {
        Self {
            source: plan.source,
            depth: 0,
            html_override: plan.html_override,
            referer: plan.referer,
        }
    }
}

/// Raw reference collected from markup, before resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMedia {
    pub value: String,
    /// The element declared an HLS MIME type.
    pub manifest_hint: bool,
}

/// Everything one document contributes, in collection order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkupScan {
    pub media: Vec<RawMedia>,
    pub frames: Vec<String>,
}

/// Scan a document for media references and frame sources.
///
/// Order: `video[src]`, `video source[src]`, `og:video`, `twitter:player`,
/// then URLs found in inline scripts.
pub fn scan_markup(html: &str) -> MarkupScan {
    let doc = Html::parse_document(html);
    let mut scan = MarkupScan::default();

    for src in select_attr(&doc, "video[src]", "src") {
        scan.media.push(RawMedia {
            value: src,
            manifest_hint: false,
        });
    }

    if let Ok(sel) = Selector::parse("video source[src]") {
        for el in doc.select(&sel) {
            let Some(src) = el.value().attr("src") else {
                continue;
            };
            let mime = el.value().attr("type").unwrap_or_default().to_ascii_lowercase();
            scan.media.push(RawMedia {
                value: src.to_string(),
                manifest_hint: HLS_TYPE_MARKERS.iter().any(|m| mime.contains(m)),
            });
        }
    }

    for selector in [
        r#"meta[property="og:video"]"#,
        r#"meta[name="twitter:player"]"#,
    ] {
        for content in select_attr(&doc, selector, "content") {
            scan.media.push(RawMedia {
                value: content,
                manifest_hint: false,
            });
        }
    }

    if let (Ok(sel), Some(url_pattern)) = (Selector::parse("script"), SCRIPT_MEDIA_URL.as_ref()) {
        let script_text = doc
            .select(&sel)
            .map(|el| el.text().collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
            // JSON blobs escape slashes
            .replace("\\/", "/");
        for found in url_pattern.find_iter(&script_text) {
            scan.media.push(RawMedia {
                value: found.as_str().to_string(),
                manifest_hint: false,
            });
        }
    }

    scan.frames = select_attr(&doc, "iframe[src]", "src");
    scan
}

fn select_attr(doc: &Html, selector: &str, attr: &str) -> Vec<String> {
    let Ok(sel) = Selector::parse(selector) else {
        return Vec::new();
    };
    doc.select(&sel)
        .filter_map(|el| el.value().attr(attr))
        .map(ToOwned::to_owned)
        .collect()
}

fn is_blob(reference: &str) -> bool {
    reference
        .trim_start()
        .get(..5)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("blob:"))
}

fn resolve_url(reference: &str, base: Option<&Url>) -> Option<Url> {
    let trimmed = reference.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(url) = Url::parse(trimmed) {
        return Some(url);
    }
    base.and_then(|base| base.join(trimmed).ok())
}

/// Turn one document's scan into candidates, resolving against `base`.
pub fn candidates_from_scan(scan: &MarkupScan, base: &str, referer: &str) -> Vec<MediaCandidate> {
    let base_url = Url::parse(base).ok();
    scan.media
        .iter()
        .filter(|raw| !raw.value.trim().is_empty() && !is_blob(&raw.value))
        .map(|raw| {
            let url = resolve_url(&raw.value, base_url.as_ref())
                .map(String::from)
                .unwrap_or_else(|| raw.value.clone());
            let kind = match classify(&url) {
                MediaKind::Unknown if raw.manifest_hint => MediaKind::Manifest,
                kind => kind,
            };
            MediaCandidate::new(url, kind, referer)
        })
        .collect()
}

fn frame_urls(scan: &MarkupScan, base: &str) -> Vec<String> {
    let base_url = Url::parse(base).ok();
    scan.frames
        .iter()
        .filter(|raw| !is_blob(raw))
        .filter_map(|raw| resolve_url(raw, base_url.as_ref()))
        .filter(|url| matches!(url.scheme(), "http" | "https"))
        .map(String::from)
        .collect()
}

/// Recursive media-candidate extractor.
pub struct CandidateExtractor {
    fetcher: Arc<dyn PageFetcher>,
}

impl CandidateExtractor {
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self { fetcher }
    }

    /// Extract candidates from the context's page and its frames.
    ///
    /// Only a failure to fetch the root page is returned as an error; frame
    /// failures are logged and contribute nothing.
    pub async fn extract(&self, ctx: ExtractionContext) -> Result<Vec<MediaCandidate>, FetchError> {
        let found = self.extract_at(ctx).await?;
        Ok(dedupe_candidates(found))
    }

    fn extract_at(
        &self,
        ctx: ExtractionContext,
    ) -> BoxFuture<'_, Result<Vec<MediaCandidate>, FetchError>> {
        Box::pin(async move {
            if ctx.depth > MAX_FRAME_DEPTH {
                return Ok(Vec::new());
            }

            let inline = ctx
                .html_override
                .clone()
                .or_else(|| looks_like_markup(&ctx.source).then(|| ctx.source.clone()));

            let (html, referer, propagated) = match inline {
                Some(html) => {
                    engine_debug!("scanning inline markup ({} bytes)", html.len());
                    let referer = ctx
                        .referer
                        .clone()
                        .unwrap_or_else(|| FALLBACK_BASE.to_string());
                    (html, referer, ctx.referer.clone())
                }
                None => {
                    engine_info!("scanning page depth={} url={}", ctx.depth, ctx.source);
                    let page = self.fetcher.fetch_page(&ctx.source).await?;
                    let referer = ctx.referer.clone().unwrap_or(page.requested_url);
                    (page.html, referer.clone(), Some(referer))
                }
            };

            // `Html` is not `Send`; finish with it before the next await.
            let (mut found, frames) = {
                let scan = scan_markup(&html);
                (
                    candidates_from_scan(&scan, &referer, &referer),
                    frame_urls(&scan, &referer),
                )
            };

            if ctx.depth < MAX_FRAME_DEPTH {
                for frame in frames {
                    engine_info!("following frame depth={} url={}", ctx.depth + 1, frame);
                    let nested = ctx.nested(frame.clone(), propagated.clone());
                    match self.extract_at(nested).await {
                        Ok(mut from_frame) => found.append(&mut from_frame),
                        Err(err) => engine_warn!("frame fetch failed url={} error={}", frame, err),
                    }
                }
            } else if !frames.is_empty() {
                engine_debug!(
                    "depth limit reached, skipping {} frame(s) below {}",
                    frames.len(),
                    ctx.source
                );
            }

            Ok(found)
        })
    }
}
