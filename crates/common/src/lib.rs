//! Shared vocabulary for the gateway: provider, market, and operation tags.

pub mod error;
pub mod types;

pub use {
    error::ParseTagError,
    types::{Market, Operation, ProviderKind, TOOL_NAMES},
};
