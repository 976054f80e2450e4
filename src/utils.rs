//! Utility functions for names and HTTP range headers

/// Longest title the publishing service accepts, in characters
pub const MAX_TITLE_CHARS: usize = 100;

/// Derive a publish title from an object's display name
///
/// The extension is stripped (`My_Clip.mp4` becomes `My_Clip`), angle brackets are
/// removed because the service rejects them, and the result is truncated to
/// [`MAX_TITLE_CHARS`].
///
/// # Examples
///
/// ```
/// use tube_relay::utils::title_from_file_name;
///
/// assert_eq!(title_from_file_name("My_Clip.mp4"), "My_Clip");
/// assert_eq!(title_from_file_name("a.b.mp4"), "a.b");
/// ```
pub fn title_from_file_name(name: &str) -> String {
    let stem = match name.rfind('.') {
        Some(i) if !name[..i].trim_start_matches('.').is_empty() => &name[..i],
        _ => name,
    };
    let cleaned: String = stem.chars().filter(|c| !matches!(c, '<' | '>')).collect();
    cleaned.trim().chars().take(MAX_TITLE_CHARS).collect()
}

/// File name for the local working copy of an object
///
/// The display name comes from the remote store and may contain path separators;
/// they are replaced so the file always lands directly in the working directory.
/// Names that would still be unusable fall back to `fallback` (the object id).
pub fn local_file_name(name: &str, fallback: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect();
    let trimmed = sanitized.trim();
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
        fallback.replace(['/', '\\', '\0'], "_")
    } else {
        trimmed.to_string()
    }
}

/// Parse a `Content-Range: bytes a-b/total` response header
///
/// Returns `(start, end_inclusive, total)`; `total` is `None` for `*`.
pub fn parse_content_range(value: &str) -> Option<(u64, u64, Option<u64>)> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (range, total) = rest.split_once('/')?;
    let (start, end) = range.split_once('-')?;
    let total = match total.trim() {
        "*" => None,
        t => Some(t.parse().ok()?),
    };
    Some((start.trim().parse().ok()?, end.trim().parse().ok()?, total))
}

/// Parse the `Range: bytes=0-N` header of a resumable-upload status response
///
/// Returns the next offset to send (`N + 1`).
pub fn next_offset_from_range(value: &str) -> Option<u64> {
    let rest = value.trim().strip_prefix("bytes=")?;
    let (_, end) = rest.split_once('-')?;
    end.trim().parse::<u64>().ok()?.checked_add(1)
}
