//! Error types for the blackboard.
//!
//! Write conflicts and permission failures are domain outcomes (`WriteOutcome`), not
//! errors. `Err` is reserved for misuse such as naming a space that does not exist.

use thiserror::Error;

/// Result type alias for blackboard operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Blackboard error types.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown knowledge space '{space}'")]
    UnknownSpace { space: String },

    #[error(transparent)]
    Core(#[from] concord_core::Error),
}

impl Error {
    /// Create an unknown space error.
    pub fn unknown_space(space: impl Into<String>) -> Self {
        Self::UnknownSpace {
            space: space.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_space_display() {
        assert_eq!(
            Error::unknown_space("drafts").to_string(),
            "unknown knowledge space 'drafts'"
        );
    }
}
