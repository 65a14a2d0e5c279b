//! Error handling module for the edge RPC layer

use thiserror::Error;

use crate::rpc::pool;
use crate::rpc::CallError;

/// Error returned by backend calls
#[derive(Error, Debug)]
pub enum Error {
    #[error("Connection pool error: {0}")]
    Pool(#[from] pool::Error),

    #[error("RPC error: {0}")]
    Rpc(#[from] CallError),
}

/// Result type for the edge RPC layer
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether retrying the same call later can succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Pool(err) => err.is_retryable(),
            Error::Rpc(CallError::Broken(_)) => true,
            Error::Rpc(CallError::Failed(_)) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_errors_convert() {
        let err: Error = pool::Error::PoolClosed.into();
        assert!(matches!(err, Error::Pool(pool::Error::PoolClosed)));
        assert_eq!(err.to_string(), "Connection pool error: connection pool is closed");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_retryable() {
        assert!(Error::from(pool::Error::AcquireTimeout).is_retryable());
        assert!(Error::from(CallError::Broken("reset".into())).is_retryable());
        assert!(!Error::from(CallError::Failed("denied".into())).is_retryable());
    }
}
