//! Logging helpers that keep chat text on a single log line.
//!
//! Message text arrives from arbitrary chat clients, so it may carry newlines,
//! control characters or pages of pasted content.

/// Longest preview written for a single field.
pub const MAX_PREVIEW: usize = 160;

/// Escape `s` for single-line logging, truncating after [`MAX_PREVIEW`] characters.
pub fn escape_log(s: &str) -> String {
    escape_log_with_limit(s, MAX_PREVIEW)
}

/// Escape newlines, tabs, backslashes and other control characters. Text past
/// `limit` characters is replaced with an ellipsis.
pub fn escape_log_with_limit(s: &str, limit: usize) -> String {
    use std::fmt::Write;

    let mut out = String::with_capacity(s.len().min(limit) + 8);
    for (count, ch) in s.chars().enumerate() {
        if count >= limit {
            out.push('…');
            break;
        }
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(&mut out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

/// Shorten a chat identity for logs (`15550001111@c.us` -> `1555…@c.us`).
pub fn redact_chat_id(chat_id: &str) -> String {
    let (local, domain) = match chat_id.split_once('@') {
        Some((l, d)) => (l, Some(d)),
        None => (chat_id, None),
    };
    let head: String = local.chars().take(4).collect();
    let shortened = if local.chars().count() > 4 { format!("{}…", head) } else { head };
    match domain {
        Some(d) => format!("{}@{}", shortened, d),
        None => shortened,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_control_characters() {
        assert_eq!(escape_log("Line1\nLine2\r\tEnd"), "Line1\\nLine2\\r\\tEnd");
        assert_eq!(escape_log("a\\b\u{7}"), "a\\\\b\\x07");
    }

    #[test]
    fn truncates_long_text() {
        let escaped = escape_log_with_limit("abcdef", 3);
        assert_eq!(escaped, "abc…");
    }

    #[test]
    fn redacts_chat_ids() {
        assert_eq!(redact_chat_id("15550001111@c.us"), "1555…@c.us");
        assert_eq!(redact_chat_id("abc"), "abc");
    }
}
