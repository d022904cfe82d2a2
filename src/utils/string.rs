//! String utility functions for safe UTF-8 text manipulation

use once_cell::sync::Lazy;
use regex::Regex;

static UNSAFE_FILENAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w\-.]").expect("valid filename regex"));

/// Safely truncate a string at a character boundary, adding ellipsis if truncated.
///
/// Unlike naive byte slicing (`&s[..n]`), this function ensures we don't slice
/// in the middle of a multi-byte UTF-8 character, which would cause a panic.
///
/// # Examples
/// ```
/// use tengen_core::utils::string::truncate_at_char_boundary;
///
/// assert_eq!(truncate_at_char_boundary("hello world", 5), "hello...");
/// assert_eq!(truncate_at_char_boundary("hello", 10), "hello");
/// ```
pub fn truncate_at_char_boundary(s: &str, max_chars: usize) -> String {
    let char_count = s.chars().count();

    if char_count <= max_chars {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// Keep at most `max_chars` characters, without an ellipsis.
pub fn take_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// Collapse every run of whitespace into a single space and trim the ends.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercase, underscore-joined form of a topic, used for research file names.
pub fn slugify(topic: &str) -> String {
    let slug: String = topic
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_");
    UNSAFE_FILENAME_CHARS.replace_all(&slug, "_").into_owned()
}

/// Make an uploaded file name safe to join onto the data directory.
///
/// Path separators and unusual characters become `_`, leading dots are
/// stripped so the result can never be hidden or climb out of the directory.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let safe = UNSAFE_FILENAME_CHARS.replace_all(base, "_");
    let safe = safe.trim_start_matches('.');

    if safe.is_empty() {
        format!("file_{}", &uuid::Uuid::new_v4().simple().to_string()[..8])
    } else {
        safe.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_ascii() {
        assert_eq!(truncate_at_char_boundary("hello", 10), "hello");
        assert_eq!(truncate_at_char_boundary("hello", 5), "hello");
        assert_eq!(truncate_at_char_boundary("hello world", 5), "hello...");
        assert_eq!(truncate_at_char_boundary("", 5), "");
    }

    #[test]
    fn test_truncate_multibyte() {
        let text = "Phase 4.1→4.2 complete";
        let result = truncate_at_char_boundary(text, 10);
        assert_eq!(result, "Phase 4.1→...");

        assert_eq!(take_chars("🎉🎊🎈", 2), "🎉🎊");
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(
            collapse_whitespace("  Quantum \n\n computing\tis   neat "),
            "Quantum computing is neat"
        );
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Quantum Computing"), "quantum_computing");
        assert_eq!(slugify("  rust / async  "), "rust___async");
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("notes.json"), "notes.json");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("my report (v2).md"), "my_report__v2_.md");
        assert_eq!(sanitize_filename(".env"), "env");
        assert!(sanitize_filename("...").starts_with("file_"));
    }
}
