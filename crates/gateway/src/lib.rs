//! The tool-server surface: JSON-RPC 2.0 over stdio, the static tool
//! catalog, and the per-tool facade that feeds the dispatcher.

pub mod context;
pub mod error;
pub mod protocol;
pub mod schema;
pub mod server;
pub mod tools;

pub use {
    context::GatewayContext,
    error::GatewayError,
    server::serve_stdio,
};
