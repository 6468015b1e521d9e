//! Input validation for display names, command prefixes and friend codes.

use std::collections::HashSet;

/// Display-name validation errors with helpful messages
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NameError {
    #[error("Name is too short (minimum {min} characters)")]
    TooShort { min: usize },

    #[error("Name is too long (maximum {max} characters)")]
    TooLong { max: usize },

    #[error("Name contains invalid characters: {chars}")]
    InvalidCharacters { chars: String },

    #[error("That name is reserved")]
    Reserved,
}

#[derive(Debug, PartialEq, Eq)]
pub enum PrefixError {
    /// Empty after trimming
    Empty,

    /// Longer than [`MAX_PREFIX_CHARS`]
    TooLong { max: usize },

    /// Contains whitespace or control characters
    InvalidCharacters,
}

impl std::fmt::Display for PrefixError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrefixError::Empty => write!(f, "Prefix cannot be empty"),
            PrefixError::TooLong { max } => write!(f, "Prefix can be at most {} characters", max),
            PrefixError::InvalidCharacters => write!(f, "Prefix cannot contain spaces or control characters"),
        }
    }
}

impl std::error::Error for PrefixError {}

pub const MIN_NAME_CHARS: usize = 2;
pub const MAX_NAME_CHARS: usize = 24;
pub const MAX_PREFIX_CHARS: usize = 3;
pub const FRIEND_CODE_LEN: usize = 8;

/// Names that would read as system or staff accounts
fn reserved_names() -> HashSet<&'static str> {
    [
        "admin", "administrator", "root", "system", "owner", "moderator", "mod",
        "bot", "questbot", "support", "staff", "null", "undefined", "everyone",
    ]
    .iter()
    .copied()
    .collect()
}

/// Validate and normalize a display name. Inner whitespace runs collapse to a
/// single space.
pub fn validate_display_name(raw: &str) -> Result<String, NameError> {
    let name = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let count = name.chars().count();
    if count < MIN_NAME_CHARS {
        return Err(NameError::TooShort { min: MIN_NAME_CHARS });
    }
    if count > MAX_NAME_CHARS {
        return Err(NameError::TooLong { max: MAX_NAME_CHARS });
    }

    let invalid: String = name
        .chars()
        .filter(|c| c.is_control() || matches!(c, '<' | '>' | '`' | '\u{200B}'..='\u{200F}'))
        .collect::<HashSet<char>>()
        .into_iter()
        .map(|c| if c.is_control() { format!("\\u{{{:04x}}}", c as u32) } else { c.to_string() })
        .collect();
    if !invalid.is_empty() {
        return Err(NameError::InvalidCharacters { chars: invalid });
    }

    if reserved_names().contains(name.to_lowercase().as_str()) {
        return Err(NameError::Reserved);
    }
    Ok(name)
}

/// Validate a per-chat command prefix (1 to 3 visible characters).
pub fn validate_prefix(raw: &str) -> Result<String, PrefixError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(PrefixError::Empty);
    }
    if trimmed.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(PrefixError::InvalidCharacters);
    }
    if trimmed.chars().count() > MAX_PREFIX_CHARS {
        return Err(PrefixError::TooLong { max: MAX_PREFIX_CHARS });
    }
    Ok(trimmed.to_string())
}

/// Uppercase a friend code and check its shape. Returns `None` when it cannot
/// possibly be a code.
pub fn normalize_friend_code(raw: &str) -> Option<String> {
    let code = raw.trim().to_ascii_uppercase();
    if code.len() == FRIEND_CODE_LEN && code.chars().all(|c| c.is_ascii_alphanumeric()) {
        Some(code)
    } else {
        None
    }
}
