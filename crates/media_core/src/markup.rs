/// Substrings that mark an input as a pasted HTML fragment rather than a URL.
pub const MARKUP_MARKERS: &[&str] = &["<video", "<source", "<html", "<meta", "<iframe"];

/// Heuristic used both by the extractor and the dispatcher: inputs carrying
/// any of the recognised tags are scanned in place and never fetched.
pub fn looks_like_markup(input: &str) -> bool {
    MARKUP_MARKERS.iter().any(|marker| input.contains(marker))
}
