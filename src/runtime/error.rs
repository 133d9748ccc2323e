//! Error types for the canopy runtime
//!
//! Contract violations are reported as `ContractError` values by the safe
//! layer. The native ABI has no error channel and aborts on them instead.

use std::io;
use thiserror::Error;

use super::actor::ActorId;
use super::object::ValueKind;

/// Top-level runtime error
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// A calling-convention rule was broken
    #[error("Contract violation: {0}")]
    Contract(#[from] ContractError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A worker thread could not be started
    #[error("Failed to spawn worker thread: {0}")]
    WorkerSpawn(#[source] io::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Misuse of a handle that the raw convention would leave undefined
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractError {
    /// A send or continuation targeted a value that is not an actor address
    #[error("expected an actor address, found {found}")]
    NotAnActor {
        /// Kind of the value that was supplied instead
        found: ValueKind,
    },

    /// An `ask` carried a reply target to an actor built with a plain handler
    #[error("actor {address} has a plain handler and cannot accept a reply target")]
    AskToPlainActor {
        /// Address of the plain actor
        address: ActorId,
    },
}

/// Convenience result alias for contract checks
pub type ContractResult<T> = std::result::Result<T, ContractError>;

/// Result type using RuntimeError
pub type Result<T> = std::result::Result<T, RuntimeError>;
