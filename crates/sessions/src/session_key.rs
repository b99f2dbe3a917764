//! Session key computation and filename escaping.

/// Compute the session key for a turn.
pub fn session_key(channel: &str, chat_id: &str) -> String {
    format!("{channel}:{chat_id}")
}

/// Escape a session key into a filesystem-safe filename. Not required to be reversible — the store keeps the key
/// alongside the file's metadata record, so this only needs to be
/// collision-free in practice.
pub fn escape_key_for_filename(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_channel_colon_chat_id() {
        assert_eq!(session_key("telegram", "12345"), "telegram:12345");
    }

    #[test]
    fn escaping_replaces_unsafe_characters() {
        assert_eq!(escape_key_for_filename("telegram:12345"), "telegram_12345");
        assert_eq!(
            escape_key_for_filename("system:cli:direct"),
            "system_cli_direct"
        );
    }

    #[test]
    fn escaping_preserves_safe_characters() {
        assert_eq!(escape_key_for_filename("a-b_c9"), "a-b_c9");
    }
}
