//! Error types shared across the coordinator.

use thiserror::Error;

/// Errors raised by transport, protocol, and statistics code.
#[derive(Error, Debug)]
pub enum Error {
    /// A parcel named a receiver this process has no route to.
    #[error("no route to peer {0:?}")]
    Routing(String),

    /// A peer sent a message the receiving state didn't expect.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// A work/heat/energy value came back NaN. The associated swap is
    /// rejected; this variant exists for logging, not for aborting the run.
    #[error("numerical failure computing {0}: value was NaN")]
    NumericalFailure(String),

    /// A peer's channel is gone. Transports in this crate do not
    /// reconnect, so this is fatal for the run.
    #[error("transport to peer {0:?} is closed")]
    Transport(String),

    /// I/O failure writing samples, energies, or statistics files.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure (de)serializing a dumped sample or energy record.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type used throughout the coordinator.
pub type Result<T> = std::result::Result<T, Error>;
