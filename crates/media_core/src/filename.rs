use crate::{classify, looks_like_markup, MediaKind};

const DEFAULT_NAME: &str = "video";
const DEFAULT_EXTENSION: &str = "mp4";
const MAX_NAME_CHARS: usize = 120;

/// On-disk file name for a retrieval: the caller's name, else the last URL
/// path segment, else `video`; made filesystem-safe and given a `.mp4`
/// extension when it lacks a direct-media one.
pub fn destination_file_name(file_name: Option<&str>, input: &str) -> String {
    let raw = file_name
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(ToOwned::to_owned)
        .or_else(|| last_path_segment(input));
    let mut name = sanitize_file_name(raw.as_deref().unwrap_or(DEFAULT_NAME));
    if classify(&name) != MediaKind::File {
        name.push('.');
        name.push_str(DEFAULT_EXTENSION);
    }
    name
}

/// Replace characters that are unsafe on common filesystems with `_`.
pub fn sanitize_file_name(input: &str) -> String {
    let cleaned: String = input
        .chars()
        .map(|c| if is_forbidden(c) { '_' } else { c })
        .collect();
    let mut name: String = cleaned.trim().chars().take(MAX_NAME_CHARS).collect();
    if name.is_empty() {
        name = DEFAULT_NAME.to_string();
    }
    if is_reserved_windows_name(&name) {
        name.push('_');
    }
    name
}

fn last_path_segment(input: &str) -> Option<String> {
    if looks_like_markup(input) {
        return None;
    }
    let end = input.find(['?', '#']).unwrap_or(input.len());
    input[..end]
        .rsplit('/')
        .next()
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(ToOwned::to_owned)
}

fn is_forbidden(c: char) -> bool {
    matches!(c,
        '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0'..='\u{1F}'
    )
}

fn is_reserved_windows_name(name: &str) -> bool {
    const RESERVED: &[&str] = &[
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(name))
}
