//! Canopy – a low-level actor runtime with a native ABI
//!
//! This crate provides:
//! - Atomically reference-counted handles to runtime values
//! - An actor table and a worker pool that runs one turn per actor at a time
//! - Tell (fire-and-forget) and Ask (request/reply) messaging
//! - Continuations: synthetic actors built from a captured frame, used as
//!   reply targets
//! - A flat `extern "C"` interface for generated code

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// Safe runtime API
pub mod runtime;

/// Native ABI over the runtime
pub mod ffi;

// Re-export key types for convenience
pub use runtime::{ContractError, Delivery, Handle, RunReport, Runtime, RuntimeConfig, Turn};

/// Current version of the Canopy runtime
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
