use finmux_common::{Operation, ProviderKind};

/// A failed upstream call, tagged with the provider that produced it.
///
/// HTTP status codes are embedded both structurally and in the rendered
/// message so downstream classification can work from either.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UpstreamError {
    #[error("{provider}: HTTP {status}: {message}")]
    Http {
        provider: ProviderKind,
        status: u16,
        message: String,
    },
    /// Application-level error payload inside a 2xx response.
    #[error("{provider}: {message}")]
    Api {
        provider: ProviderKind,
        message: String,
    },
    #[error("{provider}: network error: {message}")]
    Network {
        provider: ProviderKind,
        message: String,
    },
    #[error("{provider}: {message}")]
    Timeout {
        provider: ProviderKind,
        message: String,
    },
    #[error("{provider}: malformed {operation} response: {message}")]
    Malformed {
        provider: ProviderKind,
        operation: Operation,
        message: String,
    },
    #[error("{provider} does not support {operation}")]
    Unsupported {
        provider: ProviderKind,
        operation: Operation,
    },
}

impl UpstreamError {
    #[must_use]
    pub fn http(provider: ProviderKind, status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            provider,
            status,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn api(provider: ProviderKind, message: impl Into<String>) -> Self {
        Self::Api {
            provider,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn timeout(provider: ProviderKind, message: impl Into<String>) -> Self {
        Self::Timeout {
            provider,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn malformed(
        provider: ProviderKind,
        operation: Operation,
        message: impl Into<String>,
    ) -> Self {
        Self::Malformed {
            provider,
            operation,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn unsupported(provider: ProviderKind, operation: Operation) -> Self {
        Self::Unsupported {
            provider,
            operation,
        }
    }

    /// Wrap a transport-level failure from the HTTP client.
    #[must_use]
    pub fn transport(provider: ProviderKind, err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                provider,
                message: "request timed out".into(),
            }
        } else {
            Self::Network {
                provider,
                message: err.to_string(),
            }
        }
    }

    #[must_use]
    pub fn provider(&self) -> ProviderKind {
        match self {
            Self::Http { provider, .. }
            | Self::Api { provider, .. }
            | Self::Network { provider, .. }
            | Self::Timeout { provider, .. }
            | Self::Malformed { provider, .. }
            | Self::Unsupported { provider, .. } => *provider,
        }
    }

    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
