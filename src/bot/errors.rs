use thiserror::Error;

use crate::storage::StoreError;

/// Failures a command handler can report back to the chat.
///
/// Every variant except [`CommandError::Store`] carries text that is safe to
/// show the user verbatim.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Bad or missing arguments.
    #[error("{0}")]
    Validation(String),

    /// The command is valid but not in the sender's current state (already
    /// claimed, cooldown active, onboarding incomplete).
    #[error("{0}")]
    State(String),

    #[error("{0}")]
    NotFound(String),

    #[error("You don't have access to that command.")]
    Unauthorized,

    /// Persistence failure. Logged in full, shown to the user generically.
    #[error("store failure: {0}")]
    Store(#[from] StoreError),
}

pub const GENERIC_FAILURE: &str = "Something went wrong on our side. Please try again in a moment.";

impl CommandError {
    pub fn validation(msg: impl Into<String>) -> Self {
        CommandError::Validation(msg.into())
    }

    pub fn state(msg: impl Into<String>) -> Self {
        CommandError::State(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        CommandError::NotFound(msg.into())
    }

    /// Text to send back to the chat.
    pub fn user_message(&self) -> String {
        match self {
            CommandError::Store(_) => GENERIC_FAILURE.to_string(),
            other => other.to_string(),
        }
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            CommandError::Validation(_) => "validation",
            CommandError::State(_) => "state",
            CommandError::NotFound(_) => "not_found",
            CommandError::Unauthorized => "unauthorized",
            CommandError::Store(_) => "store",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_failures_are_not_leaked() {
        let err = CommandError::from(StoreError::Conflict("tree xyz exploded".into()));
        assert_eq!(err.user_message(), GENERIC_FAILURE);
        assert!(err.to_string().contains("xyz"));
        assert_eq!(err.kind(), "store");
    }

    #[test]
    fn user_facing_variants_pass_text_through() {
        assert_eq!(CommandError::validation("Usage: claim <id>").user_message(), "Usage: claim <id>");
        assert_eq!(
            CommandError::Unauthorized.user_message(),
            "You don't have access to that command."
        );
    }
}
