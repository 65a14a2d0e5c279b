//! Bounded pool of reusable backend RPC connections.
//!
//! Callers borrow a connection with [`Pool::get`], run one unit of work on it
//! and give it back with [`Pool::put`] (or by dropping the handle). When every
//! slot is in use, `get` waits in FIFO order until a connection is released,
//! its deadline passes, or the pool is closed. A background reaper closes
//! connections that have been idle longer than `max_idle`, never shrinking
//! the pool below `init_size`.

pub mod connection;
pub mod error;
mod inner;
mod reaper;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::{timeout_at, Instant};
use tracing::{error, info, warn};

pub use connection::{connect_fn, BoxError, ConnectFn, Connection, ConnectionFactory, Pooled, State};
pub use error::Error;

use crate::models::PoolStatus;
use crate::utils::duration_to_ms;
use connection::{Grant, Slot};
use inner::{Acquire, Shared};

/// Pool sizing and timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolOptions {
    /// Connections opened at construction and kept open while the pool is.
    pub init_size: usize,
    /// Maximum live connections, idle and checked out.
    pub capacity: usize,
    /// Idle connections older than this can be reaped.
    pub max_idle: Duration,
    /// How often the reaper runs.
    pub reap_interval: Duration,
}

impl PoolOptions {
    pub fn new(init_size: usize, capacity: usize, max_idle: Duration) -> Self {
        Self {
            init_size,
            capacity,
            max_idle,
            reap_interval: Duration::from_secs(1),
        }
    }

    pub fn with_reap_interval(mut self, reap_interval: Duration) -> Self {
        self.reap_interval = reap_interval;
        self
    }

    /// Check the sizing constraints.
    pub fn validate(&self) -> Result<(), Error> {
        if self.capacity == 0 {
            return Err(Error::InvalidConfig("capacity must be greater than 0".into()));
        }

        if self.init_size > self.capacity {
            return Err(Error::InvalidConfig(format!(
                "init_size ({}) must not exceed capacity ({})",
                self.init_size, self.capacity
            )));
        }

        if self.max_idle.is_zero() {
            return Err(Error::InvalidConfig("max_idle must be greater than 0".into()));
        }

        if self.reap_interval.is_zero() {
            return Err(Error::InvalidConfig("reap_interval must be greater than 0".into()));
        }

        Ok(())
    }
}

/// Connection pool.
pub struct Pool<F: ConnectionFactory> {
    shared: Arc<Shared<F::Connection>>,
    factory: Arc<F>,
}

impl<F: ConnectionFactory> Clone for Pool<F> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            factory: self.factory.clone(),
        }
    }
}

impl<F: ConnectionFactory> std::fmt::Debug for Pool<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.shared.lock();
        f.debug_struct("Pool")
            .field("id", &self.shared.id())
            .field("idle", &inner.idle.len())
            .field("checked_out", &inner.checked_out.len())
            .field("connecting", &inner.connecting)
            .field("closed", &inner.closed)
            .finish()
    }
}

impl<F: ConnectionFactory> Pool<F> {
    /// Create the pool, opening `init_size` connections up front.
    ///
    /// Fails without starting the pool if any of those dials fails.
    /// Must be called from within a Tokio runtime, the reaper is spawned on it.
    pub async fn new(factory: F, options: PoolOptions) -> Result<Self, Error> {
        options.validate()?;

        let mut warm = Vec::with_capacity(options.init_size);
        for _ in 0..options.init_size {
            match factory.connect().await {
                Ok(conn) => warm.push(conn),
                Err(err) => {
                    error!("failed to pre-warm connection pool: {}", err);
                    for conn in warm {
                        if let Err(err) = conn.close() {
                            warn!("failed to close pre-warmed connection: {}", err);
                        }
                    }
                    return Err(Error::DialFailed(err));
                }
            }
        }

        let shared = Arc::new(Shared::new(options, warm));
        reaper::spawn(&shared);

        info!(
            "connection pool {} ready (init_size: {}, capacity: {}, max_idle: {:?})",
            shared.id(),
            options.init_size,
            options.capacity,
            options.max_idle
        );

        Ok(Self {
            shared,
            factory: Arc::new(factory),
        })
    }

    /// Get a connection, waiting until `deadline` if the pool is at capacity.
    pub async fn get(&self, deadline: Instant) -> Result<Pooled<F::Connection>, Error> {
        let slot = match self.shared.begin_acquire(deadline)? {
            Acquire::Ready(conn) => return Ok(conn),
            Acquire::Dial(slot) => slot,
            Acquire::Wait(rx) => match timeout_at(deadline, rx).await {
                Ok(Ok(Ok(Grant::Ready(conn)))) => return Ok(conn),
                Ok(Ok(Ok(Grant::Dial(slot)))) => slot,
                Ok(Ok(Err(err))) => return Err(err),
                // Waiters are only dropped when the pool goes away.
                Ok(Err(_)) => return Err(Error::PoolClosed),
                Err(_) => {
                    self.shared.record_timeout();
                    return Err(Error::AcquireTimeout);
                }
            },
        };

        self.dial(slot).await
    }

    /// Get a connection, waiting at most `timeout`.
    pub async fn get_timeout(&self, timeout: Duration) -> Result<Pooled<F::Connection>, Error> {
        self.get(Instant::now() + timeout).await
    }

    async fn dial(&self, slot: Slot<F::Connection>) -> Result<Pooled<F::Connection>, Error> {
        match self.factory.connect().await {
            Ok(conn) => slot.fulfil(conn),
            Err(err) => {
                error!("failed to dial backend: {} [pool {}]", err, self.shared.id());
                self.shared.record_dial_failure();
                drop(slot);
                Err(Error::DialFailed(err))
            }
        }
    }

    /// Return a connection to the pool.
    ///
    /// Connections checked out from another pool are rejected and
    /// sent back where they came from.
    pub fn put(&self, conn: Pooled<F::Connection>) -> Result<(), Error> {
        if !Arc::ptr_eq(conn.shared(), &self.shared) {
            let err = Error::InvalidRelease {
                id: conn.id(),
                pool: self.shared.id(),
            };
            self.shared.record_invalid_release();
            warn!("rejected release of connection from pool {}: {}", conn.pool_id(), err);
            drop(conn);
            return Err(err);
        }

        self.shared.release(conn.detach())
    }

    /// Close the pool.
    ///
    /// Idle connections are closed right away and blocked callers fail with
    /// [`Error::PoolClosed`]. Checked out connections are closed when they
    /// are returned. Calling it more than once has no further effect.
    pub fn close(&self) {
        if self.shared.close() {
            info!("connection pool {} closed", self.shared.id());
        }
    }

    /// Close the pool and wait up to `grace` for checked out connections
    /// to come back. Returns true if every connection was closed.
    pub async fn close_graceful(&self, grace: Duration) -> bool {
        self.close();
        let deadline = Instant::now() + grace;

        loop {
            let notified = self.shared.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.shared.lock().drained() {
                return true;
            }

            if timeout_at(deadline, notified).await.is_err() {
                let drained = self.shared.lock().drained();
                if !drained {
                    warn!(
                        "connection pool {} still has connections checked out after {:?}",
                        self.shared.id(),
                        grace
                    );
                }
                return drained;
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    /// Pool identifier, unique within the process.
    pub fn id(&self) -> u64 {
        self.shared.id()
    }

    pub fn options(&self) -> &PoolOptions {
        self.shared.options()
    }

    /// Snapshot of the pool state and lifetime counters.
    pub fn status(&self) -> PoolStatus {
        let options = *self.shared.options();
        let inner = self.shared.lock();
        let counters = inner.counters;

        PoolStatus {
            pool_id: self.shared.id(),
            capacity: options.capacity,
            init_size: options.init_size,
            max_idle_ms: duration_to_ms(options.max_idle),
            total: inner.total(),
            idle: inner.idle.len(),
            checked_out: inner.checked_out.len(),
            connecting: inner.connecting,
            waiting: inner.waiting(),
            closed: inner.closed,
            created: counters.created,
            destroyed: counters.destroyed,
            acquired: counters.acquired,
            acquire_timeouts: counters.acquire_timeouts,
            dial_failures: counters.dial_failures,
            reaped: counters.reaped,
            discarded: counters.discarded,
            invalid_releases: counters.invalid_releases,
            timestamp: Utc::now(),
        }
    }
}
