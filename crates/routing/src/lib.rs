//! Market-aware source routing.
//!
//! Candidate selection (precedence):
//! 1. Per-tool custom priority (`SOURCE_PRIORITY_*`), else the default table
//! 2. Legacy `PRIMARY_API_SOURCE`/`SECONDARY_API_SOURCE` prepend
//! 3. Intersection with the symbol's market coverage (coverage order is the
//!    fallback when the intersection is empty)
//! 4. Capability and availability filtering

pub mod market;
pub mod router;

pub use {market::classify_symbol, router::SourceRouter};
