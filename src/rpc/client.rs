//! Backend RPC client built on the connection pool

use chrono::Utc;
use futures::future::BoxFuture;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, warn};

use super::pool::{BoxError, ConnectionFactory, Pool};
use crate::error::Result;
use crate::log_rpc_call;
use crate::models::CallLog;
use crate::utils::elapsed_ms;

/// Failure reported by a unit of work
#[derive(Debug, Error)]
pub enum CallError {
    /// The connection can't be trusted anymore and must not be reused
    #[error("connection broken: {0}")]
    Broken(#[source] BoxError),

    /// The call failed but the connection is fine
    #[error("call failed: {0}")]
    Failed(#[source] BoxError),
}

impl From<std::io::Error> for CallError {
    fn from(err: std::io::Error) -> Self {
        CallError::Broken(err.into())
    }
}

/// Issues backend calls, one pooled connection per call
pub struct RpcClient<F: ConnectionFactory> {
    pool: Pool<F>,
    acquire_timeout: Duration,
}

impl<F: ConnectionFactory> Clone for RpcClient<F> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            acquire_timeout: self.acquire_timeout,
        }
    }
}

impl<F: ConnectionFactory> RpcClient<F> {
    /// Create a client borrowing connections from `pool`,
    /// waiting at most `acquire_timeout` for one
    pub fn new(pool: Pool<F>, acquire_timeout: Duration) -> Self {
        Self {
            pool,
            acquire_timeout,
        }
    }

    pub fn pool(&self) -> &Pool<F> {
        &self.pool
    }

    /// Run one unit of work on a pooled connection
    ///
    /// The connection goes back to the pool afterwards, unless the work
    /// reported it broken, in which case it is closed.
    pub async fn call<T, W>(&self, uuid: &str, work: W) -> Result<T>
    where
        W: for<'c> FnOnce(&'c mut F::Connection) -> BoxFuture<'c, std::result::Result<T, CallError>>,
    {
        let deadline = tokio::time::Instant::now() + self.acquire_timeout;
        let mut conn = self.pool.get(deadline).await.map_err(|err| {
            error!("{} -- Failed to get RPC connection: {}", uuid, err);
            err
        })?;

        let connection_id = conn.id();
        let started = Instant::now();
        let result = work(&mut *conn).await;
        let duration_ms = elapsed_ms(started);

        let mut log = CallLog {
            uuid: uuid.to_string(),
            connection_id,
            duration_ms,
            error: None,
            discarded: false,
            timestamp: Utc::now(),
        };

        match result {
            Ok(value) => {
                debug!("{} -- RPC call on connection {} done ({}ms)", uuid, connection_id, duration_ms);
                self.pool.put(conn)?;
                log_rpc_call!(&log);
                Ok(value)
            }
            Err(CallError::Broken(err)) => {
                warn!("{} -- Connection {} broken, discarding: {}", uuid, connection_id, err);
                conn.discard();
                log.error = Some(err.to_string());
                log.discarded = true;
                log_rpc_call!(&log);
                Err(CallError::Broken(err).into())
            }
            Err(err) => {
                error!("{} -- Failed to communicate with backend: {}", uuid, err);
                self.pool.put(conn)?;
                log.error = Some(err.to_string());
                log_rpc_call!(&log);
                Err(err.into())
            }
        }
    }
}
