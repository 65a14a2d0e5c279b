//! Connection pool errors.

use thiserror::Error;

use super::BoxError;

/// Errors returned by the connection pool.
#[derive(Debug, Error)]
pub enum Error {
    /// The factory could not produce a connection.
    #[error("failed to dial backend: {0}")]
    DialFailed(#[source] BoxError),

    /// The deadline elapsed while waiting for a free connection.
    #[error("timed out waiting for a pooled connection")]
    AcquireTimeout,

    /// The pool has been shut down.
    #[error("connection pool is closed")]
    PoolClosed,

    /// A connection was released to a pool it is not checked out from.
    #[error("connection {id} is not checked out from pool {pool}")]
    InvalidRelease { id: u64, pool: u64 },

    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// The caller may try again with the same pool.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::DialFailed(_) | Error::AcquireTimeout)
    }
}
