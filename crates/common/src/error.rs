use thiserror::Error;

/// Failure to parse one of the shared tag enums from text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {what} tag: {value:?}")]
pub struct ParseTagError {
    pub what: &'static str,
    pub value: String,
}

impl ParseTagError {
    #[must_use]
    pub fn new(what: &'static str, value: impl Into<String>) -> Self {
        Self {
            what,
            value: value.into(),
        }
    }
}
