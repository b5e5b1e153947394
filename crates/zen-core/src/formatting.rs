//! String helpers shared by the loop, providers and the CLI

/// Length of a conversation title derived from the first message
pub const TITLE_CHARS: usize = 50;

/// Truncate a string to `max` characters, adding "..." if truncated
pub fn truncate_str(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Conversation title: the first line of the first message, cut to
/// [`TITLE_CHARS`] characters
pub fn conversation_title(first_message: &str) -> String {
    let line = first_message.lines().next().unwrap_or_default().trim();
    if line.is_empty() {
        return "New conversation".to_string();
    }
    line.chars().take(TITLE_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_str() {
        assert_eq!(truncate_str("short", 10), "short");
        assert_eq!(truncate_str("abcdefghij", 6), "abc...");
        // Multi-byte characters never split
        assert_eq!(truncate_str("ééééééé", 5), "éé...");
    }

    #[test]
    fn test_conversation_title() {
        assert_eq!(conversation_title("list files"), "list files");
        assert_eq!(conversation_title(&"x".repeat(80)).chars().count(), 50);
        assert_eq!(conversation_title("first line\nsecond"), "first line");
        assert_eq!(conversation_title("   "), "New conversation");
    }
}
