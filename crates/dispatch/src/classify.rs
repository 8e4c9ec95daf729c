//! Failure classification: decides whether the cascade moves on or stops.

use finmux_providers::UpstreamError;

const RATE_LIMIT_MARKERS: &[&str] = &[
    "429",
    "rate limit",
    "rate-limit",
    "ratelimit",
    "too many requests",
    "quota exceeded",
    "api limit",
    "throttl",
];

const TIMEOUT_MARKERS: &[&str] = &["timeout", "timed out"];

const TRANSIENT_MARKERS: &[&str] = &["econnreset", "econnrefused", "network"];

/// What a failed upstream call means for the cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    RateLimit,
    Transient,
    Timeout,
    Permanent,
}

impl ErrorClass {
    #[must_use]
    pub fn of(error: &UpstreamError) -> Self {
        if error.is_timeout() {
            return Self::Timeout;
        }
        Self::of_message(&error.to_string(), error.status())
    }

    /// Classify from the rendered message and the HTTP status, if any.
    ///
    /// Rules are checked in order; rate-limit markers win over everything,
    /// and anything unrecognized is permanent.
    #[must_use]
    pub fn of_message(message: &str, status: Option<u16>) -> Self {
        let lowered = message.to_lowercase();
        if status == Some(429) || RATE_LIMIT_MARKERS.iter().any(|m| lowered.contains(m)) {
            return Self::RateLimit;
        }
        if TIMEOUT_MARKERS.iter().any(|m| lowered.contains(m)) {
            return Self::Timeout;
        }
        if status.is_some_and(|s| (500..600).contains(&s))
            || TRANSIENT_MARKERS.iter().any(|m| lowered.contains(m))
        {
            return Self::Transient;
        }
        Self::Permanent
    }

    /// Whether the next candidate should be tried.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        !matches!(self, Self::Permanent)
    }
}
