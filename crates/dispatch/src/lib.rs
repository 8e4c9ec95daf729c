//! The dispatch and resilience core: error classification, key pools with
//! cooldown, per-provider circuit breakers, optional same-provider retry,
//! and the cascading-failover dispatcher that ties them together.

pub mod circuit;
pub mod classify;
pub mod dispatcher;
pub mod error;
pub mod key_pool;
pub mod registry;
pub mod retry;

pub use {
    circuit::{CircuitBreaker, CircuitState},
    classify::ErrorClass,
    dispatcher::{Attempt, DispatchOutcome, Dispatcher},
    error::DispatchError,
    key_pool::{AcquiredKey, KeyPool},
    registry::{ProviderHandle, ProviderRegistry},
    retry::RetryPolicy,
};
