use finmux_dispatch::DispatchError;

/// Error kinds surfaced to the caller, each rendered into the
/// `isError: true` envelope.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("service unavailable for {tool}: {reason}")]
    ServiceUnavailable { tool: String, reason: String },

    /// An upstream answered with a permanent error; its message is forwarded.
    #[error("{0}")]
    UpstreamPermanent(String),

    #[error("{0}")]
    AggregateFailure(String),

    #[error("{0}")]
    DeadlineExceeded(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Map a dispatch failure onto the caller-visible error kinds; the
    /// attempt log rides along on the aggregate and deadline variants.
    #[must_use]
    pub fn from_dispatch(tool: &str, error: DispatchError) -> Self {
        let attempts_json = serde_json::to_string(error.attempts()).unwrap_or_default();
        match error {
            DispatchError::NoCandidates { .. } | DispatchError::Unavailable { .. } => {
                Self::ServiceUnavailable {
                    tool: tool.to_string(),
                    reason: error.to_string(),
                }
            },
            DispatchError::Permanent { error, .. } => Self::UpstreamPermanent(error.to_string()),
            DispatchError::Exhausted { .. } => {
                Self::AggregateFailure(format!("{error} (attempts: {attempts_json})"))
            },
            DispatchError::DeadlineExceeded { .. } => {
                Self::DeadlineExceeded(format!("{error} (attempts: {attempts_json})"))
            },
        }
    }
}
