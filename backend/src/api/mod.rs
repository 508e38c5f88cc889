//! HTTP API module.
//!
//! Logging broadcaster plus the HTTP server and its response types.

pub mod logs;
pub mod server;
pub mod types;

pub use logs::*;
pub use server::start_server;
pub use types::*;
