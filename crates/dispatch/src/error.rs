use {finmux_common::Operation, finmux_providers::UpstreamError};

use crate::dispatcher::Attempt;

/// Terminal outcome of a failed dispatch. The attempt log is preserved on
/// every variant that ran at least part of the cascade.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The router produced no candidates at all.
    #[error("no provider available for {operation}")]
    NoCandidates { operation: Operation },

    /// Candidates existed but every one was skipped before an upstream call
    /// (circuits open, pools cooling).
    #[error("all providers skipped for {operation}: circuits open or keys cooling down")]
    Unavailable {
        operation: Operation,
        attempts: Vec<Attempt>,
    },

    /// A candidate failed permanently; the cascade stopped there.
    #[error("{error}")]
    Permanent {
        error: UpstreamError,
        attempts: Vec<Attempt>,
    },

    /// Every candidate was tried and failed with a retryable class.
    #[error("all providers failed for {operation}: {summary}")]
    Exhausted {
        operation: Operation,
        summary: String,
        attempts: Vec<Attempt>,
    },

    /// The caller's deadline elapsed mid-cascade.
    #[error("deadline exceeded for {operation} after {elapsed_ms} ms")]
    DeadlineExceeded {
        operation: Operation,
        elapsed_ms: u64,
        attempts: Vec<Attempt>,
    },
}

impl DispatchError {
    /// The attempt log, for debugging surfaces.
    #[must_use]
    pub fn attempts(&self) -> &[Attempt] {
        match self {
            Self::NoCandidates { .. } => &[],
            Self::Unavailable { attempts, .. }
            | Self::Permanent { attempts, .. }
            | Self::Exhausted { attempts, .. }
            | Self::DeadlineExceeded { attempts, .. } => attempts,
        }
    }
}
