//! Text helpers.

/// Truncate to at most `max_chars` characters without splitting a code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Single-line preview with an ellipsis when the text was cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    let cut = truncate_chars(text, max_chars);
    let flat = cut.split_whitespace().collect::<Vec<_>>().join(" ");
    if cut.len() < text.len() {
        format!("{flat}...")
    } else {
        flat
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 2), "he");
        assert_eq!(truncate_chars("환불 정책", 2), "환불");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn test_preview() {
        assert_eq!(preview("a\nb  c", 10), "a b c");
        assert_eq!(preview("abcdef", 3), "abc...");
    }
}
