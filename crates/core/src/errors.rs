//! Error types for the mergemend core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.
//!
//! The merge executor deliberately has no error type: it reports through
//! [`MergeOutcome`](crate::conflict::MergeOutcome) so that the semantic
//! fallback is ordinary control flow.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Vcs(#[from] VcsError),

    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error(transparent)]
    Proposal(#[from] ProposalError),

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// VCS errors
// ---------------------------------------------------------------------------

/// Errors from the version-control adapter.
#[derive(Debug, Error)]
pub enum VcsError {
    /// The repository path does not exist or is not a git repo.
    #[error("git repository not found at '{0}'")]
    RepositoryNotFound(String),

    /// The repository has no working directory (bare repository).
    #[error("repository at '{0}' has no working directory")]
    BareRepository(String),

    /// A `git2` library error.
    #[error("git2 error: {0}")]
    Git2Error(#[from] git2::Error),

    /// A path would resolve outside of the working directory.
    #[error("path '{0}' is outside the repository working directory")]
    PathOutsideWorkdir(String),

    /// The file is not valid UTF-8 text.
    #[error("file '{0}' is not valid UTF-8 text")]
    NotText(String),

    /// Generic I/O wrapper.
    #[error("vcs I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Completion errors
// ---------------------------------------------------------------------------

/// Errors from the text-completion service used for semantic merges.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// HTTP-level transport error (network, TLS, timeout, etc.).
    #[error("completion HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The API returned a non-success status code.
    #[error("completion API error (HTTP {status}): {body}")]
    ApiError { status: u16, body: String },

    /// The response body did not have the expected shape.
    #[error("malformed completion response: {0}")]
    MalformedResponse(String),

    /// No API key or endpoint is available.
    #[error("completion service not configured: {0}")]
    NotConfigured(String),
}

// ---------------------------------------------------------------------------
// Proposal errors
// ---------------------------------------------------------------------------

/// Errors from the proposal manager.
#[derive(Debug, Error)]
pub enum ProposalError {
    /// The requested proposal ID was not found.
    #[error("proposal not found: {0}")]
    NotFound(String),
}

// ---------------------------------------------------------------------------
// Orchestrator errors
// ---------------------------------------------------------------------------

/// Hard failures of a batch operation.
///
/// Per-file problems never surface here; they are recorded in the batch
/// result instead.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The VCS adapter could not list conflicted files at all.
    #[error("failed to list conflicted files: {0}")]
    ListFailed(#[source] VcsError),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = VcsError::RepositoryNotFound("/tmp/repo".into());
        assert_eq!(err.to_string(), "git repository not found at '/tmp/repo'");

        let err = CompletionError::ApiError {
            status: 429,
            body: "slow down".into(),
        };
        assert!(err.to_string().contains("HTTP 429"));

        let err = ProposalError::NotFound("abc".into());
        assert_eq!(err.to_string(), "proposal not found: abc");

        let err = ConfigError::InvalidValue {
            field: "completion.timeout_secs".into(),
            detail: "must be > 0".into(),
        };
        assert!(err.to_string().contains("completion.timeout_secs"));
    }

    #[test]
    fn test_core_error_from_subsystem() {
        let core_err: CoreError = ProposalError::NotFound("x".into()).into();
        assert!(matches!(core_err, CoreError::Proposal(_)));

        let core_err: CoreError =
            OrchestratorError::ListFailed(VcsError::RepositoryNotFound("/r".into())).into();
        assert!(matches!(core_err, CoreError::Orchestrator(_)));
    }
}
