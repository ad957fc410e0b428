use std::borrow::Cow;

/// Strip ASCII control characters from feed-supplied text.
///
/// Tab, newline and carriage return are kept. Returns `Cow::Borrowed` when
/// nothing needs removing, which is the common case.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    let is_control = |c: char| c == '\u{7f}' || (c < '\u{20}' && !matches!(c, '\t' | '\n' | '\r'));

    if !s.chars().any(is_control) {
        return Cow::Borrowed(s);
    }

    Cow::Owned(s.chars().filter(|&c| !is_control(c)).collect())
}

/// Truncate `s` to at most `max_chars` characters.
///
/// Cuts on a char boundary so the result is always valid UTF-8. Returns the
/// (possibly borrowed) text and whether anything was removed. Deterministic:
/// the same input and ceiling always produce the same output.
///
/// ```
/// use feedsync::util::truncate_chars;
///
/// assert_eq!(truncate_chars("hello", 10), ("hello".into(), false));
/// assert_eq!(truncate_chars("hello", 4), ("hell".into(), true));
/// assert_eq!(truncate_chars("héllo", 2), ("hé".into(), true));
/// ```
pub fn truncate_chars(s: &str, max_chars: usize) -> (Cow<'_, str>, bool) {
    match s.char_indices().nth(max_chars) {
        Some((byte_end, _)) => (Cow::Owned(s[..byte_end].to_string()), true),
        None => (Cow::Borrowed(s), false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_clean_text_returns_borrowed() {
        let input = "Plain title";
        assert!(matches!(strip_control_chars(input), Cow::Borrowed(_)));
    }

    #[test]
    fn test_strip_removes_controls_keeps_whitespace() {
        assert_eq!(strip_control_chars("a\x00b\x1bc\x7fd"), "abcd");
        assert_eq!(strip_control_chars("line\tone\r\nline two"), "line\tone\r\nline two");
    }

    #[test]
    fn test_strip_preserves_unicode() {
        assert_eq!(strip_control_chars("日本語\x07"), "日本語");
    }

    #[test]
    fn test_truncate_exact_fit_is_not_marked() {
        let (out, truncated) = truncate_chars("abcd", 4);
        assert_eq!(out, "abcd");
        assert!(!truncated);
    }

    #[test]
    fn test_truncate_multibyte_boundary() {
        let (out, truncated) = truncate_chars("日本語テキスト", 3);
        assert_eq!(out, "日本語");
        assert!(truncated);
    }

    #[test]
    fn test_truncate_to_zero() {
        let (out, truncated) = truncate_chars("abc", 0);
        assert_eq!(out, "");
        assert!(truncated);

        let (out, truncated) = truncate_chars("", 0);
        assert_eq!(out, "");
        assert!(!truncated);
    }
}
