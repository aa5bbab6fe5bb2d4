//! Error types for RecipeForge.
//!
//! Library crates use [`RecipeForgeError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all RecipeForge operations.
#[derive(Debug, thiserror::Error)]
pub enum RecipeForgeError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error during site search or page fetch.
    #[error("network error: {0}")]
    Network(String),

    /// HTML parsing or recipe extraction error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Recipe batch persistence error.
    #[error("storage error: {0}")]
    Storage(String),

    /// LLM call failure (transport, API, or response decoding).
    #[error("llm error: {0}")]
    Llm(String),

    /// The model provider refused the content.
    #[error("content filtered: {0}")]
    ContentFiltered(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Caller error (empty ids, malformed input).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Every query reformulation came back empty.
    #[error("no recipes found after {} attempts: {}", attempts.len(), attempts.join(", "))]
    NoRecipesFound { attempts: Vec<String> },

    /// An agent run finished without making the expected tool call.
    #[error("synthesis protocol error: {0}")]
    SynthesisProtocol(String),

    /// The synthesis loop hit its attempt cap without clearing the quality bar.
    #[error("synthesis did not converge after {attempts} attempts (best score {best_score})")]
    SynthesisExhausted { attempts: u32, best_score: u8 },

    /// Work abandoned because its cancellation token fired.
    #[error("operation cancelled")]
    Cancelled,
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, RecipeForgeError>;

impl RecipeForgeError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True for provider-side content policy rejections.
    pub fn is_content_filtered(&self) -> bool {
        matches!(self, Self::ContentFiltered(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = RecipeForgeError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = RecipeForgeError::validation("recipe id must not be empty");
        assert!(err.to_string().contains("recipe id"));
    }

    #[test]
    fn no_recipes_found_lists_attempts() {
        let err = RecipeForgeError::NoRecipesFound {
            attempts: vec!["xyz".into(), "xyz stew".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("2 attempts"));
        assert!(msg.contains("xyz stew"));
    }

    #[test]
    fn content_filter_is_distinguished() {
        assert!(RecipeForgeError::ContentFiltered("policy".into()).is_content_filtered());
        assert!(!RecipeForgeError::Llm("timeout".into()).is_content_filtered());
    }
}
