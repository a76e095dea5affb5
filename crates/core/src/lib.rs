//! Rosterhub Core - response cache, source arbitration and event fan-out.
//!
//! This crate is transport-agnostic: the HTTP server in `apps/server` wires
//! the pieces together and decides response shapes from [`ErrorKind`].

pub mod cache;
pub mod errors;
pub mod events;

// Re-export error types
pub use errors::Error;
pub use errors::ErrorKind;
pub use errors::Result;
