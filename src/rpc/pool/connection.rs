//! Pooled connections and the factory seam.

use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::inner::Shared;
use super::Error;

/// Boxed error produced by factories and connections.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A backend connection the pool can hand out.
///
/// The pool never looks inside the connection, it only closes it
/// once the connection is no longer needed.
pub trait Connection: Send + 'static {
    fn close(self) -> Result<(), BoxError>;
}

/// Produces new backend connections on demand.
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    type Connection: Connection;

    async fn connect(&self) -> Result<Self::Connection, BoxError>;
}

/// Factory backed by an async closure, see [`connect_fn`].
#[derive(Clone)]
pub struct ConnectFn<F> {
    f: F,
}

/// Use an async closure as a [`ConnectionFactory`].
pub fn connect_fn<F>(f: F) -> ConnectFn<F> {
    ConnectFn { f }
}

#[async_trait]
impl<F, Fut, C> ConnectionFactory for ConnectFn<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<C, BoxError>> + Send,
    C: Connection,
{
    type Connection = C;

    async fn connect(&self) -> Result<C, BoxError> {
        (self.f)().await
    }
}

/// Where a connection currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    CheckedOut,
}

/// A live connection plus the pool's bookkeeping.
pub(super) struct Live<C> {
    pub(super) id: u64,
    pub(super) conn: C,
    pub(super) created_at: Instant,
    pub(super) released_at: Instant,
    pub(super) state: State,
}

impl<C> Live<C> {
    pub(super) fn new(id: u64, conn: C, state: State) -> Self {
        let now = Instant::now();
        Self {
            id,
            conn,
            created_at: now,
            released_at: now,
            state,
        }
    }

    /// How long the connection has been sitting idle.
    pub(super) fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.released_at)
    }
}

/// A connection checked out of the pool.
///
/// Dropping the handle returns the connection to the pool it came from,
/// the same as calling [`Pool::put`](super::Pool::put).
pub struct Pooled<C: Connection> {
    live: Option<Live<C>>,
    shared: Arc<Shared<C>>,
}

impl<C: Connection> Pooled<C> {
    pub(super) fn new(mut live: Live<C>, shared: Arc<Shared<C>>) -> Self {
        live.state = State::CheckedOut;
        Self {
            live: Some(live),
            shared,
        }
    }

    /// Connection identifier, unique within its pool.
    pub fn id(&self) -> u64 {
        self.live().id
    }

    /// Identifier of the pool this connection belongs to.
    pub fn pool_id(&self) -> u64 {
        self.shared.id()
    }

    /// How long ago the factory created this connection.
    pub fn age(&self) -> Duration {
        self.live().created_at.elapsed()
    }

    /// Close the connection instead of returning it for reuse.
    ///
    /// Use this when the unit of work left the connection in an unknown state.
    pub fn discard(mut self) {
        if let Some(live) = self.live.take() {
            self.shared.discard(live);
        }
    }

    pub(super) fn shared(&self) -> &Arc<Shared<C>> {
        &self.shared
    }

    /// Take the connection out of the handle without returning it.
    pub(super) fn detach(mut self) -> Live<C> {
        self.live.take().expect("pooled connection already released")
    }

    fn live(&self) -> &Live<C> {
        self.live.as_ref().expect("pooled connection already released")
    }
}

impl<C: Connection> Deref for Pooled<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.live().conn
    }
}

impl<C: Connection> DerefMut for Pooled<C> {
    fn deref_mut(&mut self) -> &mut C {
        &mut self
            .live
            .as_mut()
            .expect("pooled connection already released")
            .conn
    }
}

impl<C: Connection> Drop for Pooled<C> {
    fn drop(&mut self) {
        if let Some(live) = self.live.take() {
            // Only fails for untracked connections, which the pool already logged.
            let _ = self.shared.release(live);
        }
    }
}

impl<C: Connection> std::fmt::Debug for Pooled<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pooled")
            .field("id", &self.live.as_ref().map(|live| live.id))
            .field("pool", &self.shared.id())
            .finish()
    }
}

/// Permission to dial one new connection.
///
/// Holds a capacity slot. Dropping it without a connection gives the
/// slot back to the pool.
pub(super) struct Slot<C: Connection> {
    shared: Option<Arc<Shared<C>>>,
}

impl<C: Connection> Slot<C> {
    pub(super) fn new(shared: Arc<Shared<C>>) -> Self {
        Self {
            shared: Some(shared),
        }
    }

    /// Register a freshly dialled connection as checked out.
    pub(super) fn fulfil(mut self, conn: C) -> Result<Pooled<C>, Error> {
        match self.shared.take() {
            Some(shared) => shared.fulfil(conn),
            None => Err(Error::PoolClosed),
        }
    }
}

impl<C: Connection> Drop for Slot<C> {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            shared.release_slot();
        }
    }
}

/// What a waiting caller is handed.
pub(super) enum Grant<C: Connection> {
    /// A released connection.
    Ready(Pooled<C>),
    /// A free slot, the caller dials itself.
    Dial(Slot<C>),
}
