//! Stored filename derivation
//!
//! Uploaded files are stored under a name derived from the client's
//! original filename: basename only, illegal characters stripped, length
//! capped, and an epoch-millisecond suffix appended so repeat uploads of
//! the same document never overwrite each other.

/// Characters Windows and most browsers refuse in filenames
const ILLEGAL_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Longest stem kept, in characters
pub const MAX_STEM_CHARS: usize = 100;

/// Longest extension kept, in characters
pub const MAX_EXTENSION_CHARS: usize = 10;

/// Stem used when nothing usable survives sanitization
const FALLBACK_STEM: &str = "file";

fn is_trimmable(c: char) -> bool {
    c.is_whitespace() || c == '.'
}

/// Split `name` into stem and extension at the last dot
///
/// A leading dot does not start an extension, and an empty extension is
/// treated as none.
pub fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    }
}

/// Clean a client-supplied filename without the timestamp suffix
///
/// Returns `(stem, extension)`; the stem is never empty.
pub fn clean_filename(original: &str) -> (String, Option<String>) {
    let basename = original.rsplit(['/', '\\']).next().unwrap_or(original);

    let cleaned: String = basename
        .chars()
        .filter(|c| !ILLEGAL_CHARS.contains(c) && !c.is_control())
        .collect();
    let cleaned = cleaned.trim_matches(is_trimmable);

    let (stem, ext) = split_extension(cleaned);

    let stem: String = stem.chars().take(MAX_STEM_CHARS).collect();
    let stem = stem.trim_matches(is_trimmable);
    let stem = if stem.is_empty() {
        FALLBACK_STEM.to_string()
    } else {
        stem.to_string()
    };

    let ext = ext
        .map(|e| e.trim().chars().take(MAX_EXTENSION_CHARS).collect::<String>())
        .filter(|e| !e.is_empty());

    (stem, ext)
}

/// Derive the stored filename: cleaned stem, `_<millis>`, then extension
///
/// ```
/// use qms_upload::sanitize::sanitize_filename;
///
/// assert_eq!(
///     sanitize_filename("C:\\scans\\brake<test>.pdf", 1700000000000),
///     "braketest_1700000000000.pdf"
/// );
/// ```
pub fn sanitize_filename(original: &str, millis: i64) -> String {
    let (stem, ext) = clean_filename(original);
    with_suffix(&stem, ext.as_deref(), millis)
}

/// Join stem, timestamp suffix and optional extension
pub fn with_suffix(stem: &str, ext: Option<&str>, millis: i64) -> String {
    match ext {
        Some(ext) => format!("{}_{}.{}", stem, millis, ext),
        None => format!("{}_{}", stem, millis),
    }
}

/// Recover the display name from a stored filename
///
/// Drops the `_<digits>` suffix added at upload; names without one are
/// returned unchanged.
pub fn original_name(stored: &str) -> String {
    let (stem, ext) = split_extension(stored);
    let stem = match stem.rsplit_once('_') {
        Some((head, digits))
            if !head.is_empty()
                && !digits.is_empty()
                && digits.chars().all(|c| c.is_ascii_digit()) =>
        {
            head
        }
        _ => stem,
    };
    match ext {
        Some(ext) => format!("{}.{}", stem, ext),
        None => stem.to_string(),
    }
}
