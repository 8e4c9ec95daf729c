//! Environment-derived gateway configuration.
//!
//! All knobs come from environment variables (see `Settings::from_lookup`
//! for the recognized names). Parsing is injected with a lookup closure so
//! tests never touch the process environment.

pub mod settings;

pub use settings::{
    CircuitBreakerSettings, KeyRotationSettings, RetrySettings, Settings,
};
