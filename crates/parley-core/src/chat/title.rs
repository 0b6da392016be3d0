//! Conversation titles derived from the first user turn.

/// Maximum title length in characters, excluding the ellipsis.
pub const MAX_TITLE_CHARS: usize = 50;

/// Title used when the first user turn has no visible text.
pub const UNTITLED: &str = "Untitled chat";

/// Derive a conversation title from the first user turn.
///
/// Whitespace runs (including newlines) collapse to single spaces. Content
/// longer than [`MAX_TITLE_CHARS`] characters is cut at that many characters
/// and suffixed with `...`. Counting is by character, never by byte.
#[tracing::instrument(level = "debug", skip(first_user_turn))]
pub fn derive_title(first_user_turn: &str) -> String {
    let collapsed = first_user_turn.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.is_empty() {
        return UNTITLED.to_string();
    }

    if collapsed.chars().count() <= MAX_TITLE_CHARS {
        return collapsed;
    }

    let prefix: String = collapsed.chars().take(MAX_TITLE_CHARS).collect();
    format!("{}...", prefix.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_content_is_the_title() {
        assert_eq!(derive_title("Hello"), "Hello");
        assert_eq!(derive_title("  Hello  "), "Hello");
    }

    #[test]
    fn exactly_fifty_chars_is_not_truncated() {
        let content = "a".repeat(50);
        assert_eq!(derive_title(&content), content);
    }

    #[test]
    fn long_content_is_truncated_with_ellipsis() {
        let content = "b".repeat(51);
        let title = derive_title(&content);
        assert_eq!(title, format!("{}...", "b".repeat(50)));
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        let content = "é".repeat(60);
        let title = derive_title(&content);
        assert_eq!(title.chars().count(), 53);
        assert!(title.starts_with(&"é".repeat(50)));
    }

    #[test]
    fn newlines_collapse() {
        assert_eq!(derive_title("line one\n\nline two"), "line one line two");
    }

    #[test]
    fn blank_content_gets_placeholder() {
        assert_eq!(derive_title(" \n\t"), UNTITLED);
    }

    #[test]
    fn derivation_is_idempotent() {
        let content = "Explain the borrow checker to me like I am five years old please";
        assert_eq!(derive_title(content), derive_title(content));
    }
}
