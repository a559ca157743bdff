//! Error taxonomy shared by the content store, the generator and the orchestrator

use uuid::Uuid;

/// Failures surfaced by the document patch flow.
///
/// A verification mismatch is not listed here: it never aborts an edit and is
/// reported through [`crate::patch::orchestrator::Verification`] instead.
#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    /// Traversal or malformed path. Raised before any filesystem access.
    #[error("path rejected: {path}: {reason}")]
    PathRejected { path: String, reason: &'static str },

    /// No document exists at the path.
    #[error("not found: {0}")]
    NotFound(String),

    /// Read-side I/O failure other than a missing file.
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The generative collaborator was unreachable, timed out or answered malformed.
    #[error("generation failed: {0}")]
    GenerationFailed(String),

    /// The commit write did not happen; the previous document is untouched.
    #[error("apply failed for {path}: {reason}")]
    ApplyFailed { path: String, reason: String },

    /// The request token was invalidated before the commit step.
    #[error("edit request {0} was cancelled")]
    Cancelled(Uuid),
}

impl PatchError {
    pub fn rejected(path: impl Into<String>, reason: &'static str) -> Self {
        Self::PathRejected {
            path: path.into(),
            reason,
        }
    }

    /// Whether re-invoking the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::GenerationFailed(_) | Self::ApplyFailed { .. } | Self::Io { .. }
        )
    }
}

pub type Result<T, E = PatchError> = std::result::Result<T, E>;
