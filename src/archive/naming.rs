/// Longest file stem we produce, in characters
const MAX_STEM_CHARS: usize = 200;

/// Make `raw` safe to use as one path component
///
/// Path separators, reserved punctuation and control characters are removed,
/// runs of whitespace become a single `_`.
pub fn sanitize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_space = false;

    for ch in raw.chars() {
        if ch.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if ch.is_control() || matches!(ch, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*') {
            continue;
        }
        if pending_space {
            out.push('_');
            pending_space = false;
        }
        out.push(ch);
    }

    let out = out.trim_matches('.').to_string();
    if out.is_empty() {
        return "untitled".to_string();
    }
    out.chars().take(MAX_STEM_CHARS).collect()
}

/// `{title}_{label}.cbz`, both parts sanitized
pub fn artifact_name(title: &str, label: &str) -> String {
    format!("{}_{}.cbz", sanitize(title), sanitize(label))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_name() {
        assert_eq!(artifact_name("One Piece", "Chapter 12"), "One_Piece_Chapter_12.cbz");
        assert_eq!(artifact_name("AC/DC: Live", "Volume 1"), "ACDC_Live_Volume_1.cbz");
    }

    #[test]
    fn test_sanitize_strips_unsafe_characters() {
        assert_eq!(sanitize("../../etc/passwd"), "etcpasswd");
        assert_eq!(sanitize("a\u{0}b\tc"), "ab_c");
        assert_eq!(sanitize("  spaced   out  "), "spaced_out");
        assert_eq!(sanitize("what?*<>|"), "what");
    }

    #[test]
    fn test_sanitize_never_empty() {
        assert_eq!(sanitize(""), "untitled");
        assert_eq!(sanitize("///"), "untitled");
        assert_eq!(sanitize(".."), "untitled");
    }

    #[test]
    fn test_sanitize_caps_length() {
        let long = "x".repeat(500);
        assert_eq!(sanitize(&long).chars().count(), MAX_STEM_CHARS);
    }
}
