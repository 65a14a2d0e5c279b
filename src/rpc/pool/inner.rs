//! Pool internals synchronized with a mutex.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use tokio::sync::{oneshot, Notify};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::connection::{Connection, Grant, Live, Pooled, Slot, State};
use super::{Error, PoolOptions};

static POOL_ID: AtomicU64 = AtomicU64::new(1);

/// Sending half of a blocked `get`.
pub(super) type Waiter<C> = oneshot::Sender<Result<Grant<C>, Error>>;

/// Receiving half of a blocked `get`.
pub(super) type WaitFor<C> = oneshot::Receiver<Result<Grant<C>, Error>>;

/// Lifetime counters.
#[derive(Debug, Default, Clone, Copy)]
pub(super) struct Counters {
    pub(super) created: u64,
    pub(super) destroyed: u64,
    pub(super) acquired: u64,
    pub(super) acquire_timeouts: u64,
    pub(super) dial_failures: u64,
    pub(super) reaped: u64,
    pub(super) discarded: u64,
    pub(super) invalid_releases: u64,
}

/// Pool internals protected by a mutex.
pub(super) struct Inner<C: Connection> {
    /// Idle connections, most recently released last.
    pub(super) idle: Vec<Live<C>>,
    /// Ids of connections held by callers.
    pub(super) checked_out: HashSet<u64>,
    /// Slots reserved for dials that haven't finished.
    pub(super) connecting: usize,
    /// Callers blocked in `get`, oldest first.
    pub(super) waiting: VecDeque<Waiter<C>>,
    pub(super) closed: bool,
    pub(super) counters: Counters,
    next_id: u64,
}

impl<C: Connection> Inner<C> {
    fn new() -> Self {
        Self {
            idle: Vec::new(),
            checked_out: HashSet::new(),
            connecting: 0,
            waiting: VecDeque::new(),
            closed: false,
            counters: Counters::default(),
            next_id: 1,
        }
    }

    /// Live connections, idle and checked out.
    #[inline]
    pub(super) fn total(&self) -> usize {
        self.idle.len() + self.checked_out.len()
    }

    /// Capacity in use, including dials in flight.
    #[inline]
    pub(super) fn slots(&self) -> usize {
        self.total() + self.connecting
    }

    /// Callers still waiting for a connection.
    pub(super) fn waiting(&self) -> usize {
        self.waiting.iter().filter(|waiter| !waiter.is_closed()).count()
    }

    /// Closed and every connection accounted for.
    #[inline]
    pub(super) fn drained(&self) -> bool {
        self.closed && self.slots() == 0
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Oldest waiter that hasn't given up yet.
    fn take_waiter(&mut self) -> Option<Waiter<C>> {
        while let Some(waiter) = self.waiting.pop_front() {
            if !waiter.is_closed() {
                return Some(waiter);
            }
        }

        None
    }

    /// Reserve a free slot for the oldest waiter, if any.
    fn grant_slot(&mut self, capacity: usize) -> Option<Waiter<C>> {
        if self.closed || self.slots() >= capacity {
            return None;
        }

        let waiter = self.take_waiter()?;
        self.connecting += 1;
        Some(waiter)
    }
}

/// Outcome of the non-blocking part of `get`.
pub(super) enum Acquire<C: Connection> {
    Ready(Pooled<C>),
    Dial(Slot<C>),
    Wait(WaitFor<C>),
}

/// State shared by the pool, its handles and the reaper.
pub(crate) struct Shared<C: Connection> {
    id: u64,
    options: PoolOptions,
    inner: Mutex<Inner<C>>,
    shutdown: Arc<Notify>,
    pub(super) drained: Notify,
}

impl<C: Connection> Shared<C> {
    /// Create pool state holding already dialled connections as idle.
    pub(super) fn new(options: PoolOptions, warm: Vec<C>) -> Self {
        let mut inner = Inner::new();
        for conn in warm {
            let id = inner.next_id();
            inner.idle.push(Live::new(id, conn, State::Idle));
            inner.counters.created += 1;
        }

        Self {
            id: POOL_ID.fetch_add(1, Ordering::Relaxed),
            options,
            inner: Mutex::new(inner),
            shutdown: Arc::new(Notify::new()),
            drained: Notify::new(),
        }
    }

    #[inline]
    pub(super) fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub(super) fn options(&self) -> &PoolOptions {
        &self.options
    }

    /// Pool exclusive lock.
    #[inline]
    pub(super) fn lock(&self) -> MutexGuard<'_, Inner<C>> {
        self.inner.lock()
    }

    /// Signal used to stop the reaper.
    pub(super) fn shutdown_signal(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Take an idle connection, reserve a slot to dial one,
    /// or join the wait queue.
    pub(super) fn begin_acquire(self: &Arc<Self>, deadline: Instant) -> Result<Acquire<C>, Error> {
        let mut inner = self.lock();

        if inner.closed {
            return Err(Error::PoolClosed);
        }

        if let Some(live) = inner.idle.pop() {
            inner.checked_out.insert(live.id);
            inner.counters.acquired += 1;
            drop(inner);
            return Ok(Acquire::Ready(Pooled::new(live, self.clone())));
        }

        if inner.slots() < self.options.capacity {
            inner.connecting += 1;
            drop(inner);
            return Ok(Acquire::Dial(Slot::new(self.clone())));
        }

        if deadline <= Instant::now() {
            inner.counters.acquire_timeouts += 1;
            return Err(Error::AcquireTimeout);
        }

        let (tx, rx) = oneshot::channel();
        inner.waiting.retain(|waiter| !waiter.is_closed());
        inner.waiting.push_back(tx);

        Ok(Acquire::Wait(rx))
    }

    /// Register a freshly dialled connection as checked out.
    pub(super) fn fulfil(self: &Arc<Self>, conn: C) -> Result<Pooled<C>, Error> {
        let mut inner = self.lock();
        inner.connecting = inner.connecting.saturating_sub(1);

        if inner.closed {
            let drained = inner.drained();
            drop(inner);
            if let Err(err) = conn.close() {
                warn!("failed to close connection dialled during shutdown: {} [pool {}]", err, self.id);
            }
            if drained {
                self.drained.notify_waiters();
            }
            return Err(Error::PoolClosed);
        }

        let id = inner.next_id();
        inner.checked_out.insert(id);
        inner.counters.created += 1;
        inner.counters.acquired += 1;
        drop(inner);

        debug!("opened connection {} [pool {}]", id, self.id);
        Ok(Pooled::new(Live::new(id, conn, State::CheckedOut), self.clone()))
    }

    /// Give back a slot whose dial never produced a connection.
    pub(super) fn release_slot(self: &Arc<Self>) {
        let (waiter, drained) = {
            let mut inner = self.lock();
            inner.connecting = inner.connecting.saturating_sub(1);
            (inner.grant_slot(self.options.capacity), inner.drained())
        };

        if let Some(waiter) = waiter {
            let _ = waiter.send(Ok(Grant::Dial(Slot::new(self.clone()))));
        }

        if drained {
            self.drained.notify_waiters();
        }
    }

    /// Check a connection back in, handing it to the oldest waiter if there is one.
    pub(super) fn release(self: &Arc<Self>, mut live: Live<C>) -> Result<(), Error> {
        let mut inner = self.lock();

        if !inner.checked_out.remove(&live.id) {
            inner.counters.invalid_releases += 1;
            drop(inner);
            return Err(self.reject(live));
        }

        if inner.closed {
            inner.counters.destroyed += 1;
            let drained = inner.drained();
            drop(inner);
            self.close_live(live, "pool closed");
            if drained {
                self.drained.notify_waiters();
            }
            return Ok(());
        }

        live.released_at = Instant::now();

        if let Some(waiter) = inner.take_waiter() {
            inner.checked_out.insert(live.id);
            inner.counters.acquired += 1;
            drop(inner);

            debug!("handing connection {} to a waiting caller [pool {}]", live.id, self.id);
            // If the waiter gave up meanwhile, dropping the returned
            // handle checks the connection in again.
            let _ = waiter.send(Ok(Grant::Ready(Pooled::new(live, self.clone()))));
            return Ok(());
        }

        live.state = State::Idle;
        inner.idle.push(live);

        Ok(())
    }

    /// Close a checked out connection instead of reusing it.
    pub(super) fn discard(self: &Arc<Self>, live: Live<C>) {
        let mut inner = self.lock();

        if !inner.checked_out.remove(&live.id) {
            inner.counters.invalid_releases += 1;
            drop(inner);
            self.reject(live);
            return;
        }

        inner.counters.discarded += 1;
        inner.counters.destroyed += 1;
        let waiter = inner.grant_slot(self.options.capacity);
        let drained = inner.drained();
        drop(inner);

        self.close_live(live, "discarded");

        if let Some(waiter) = waiter {
            let _ = waiter.send(Ok(Grant::Dial(Slot::new(self.clone()))));
        }

        if drained {
            self.drained.notify_waiters();
        }
    }

    /// Mark the pool closed, close idle connections and release waiters.
    ///
    /// Returns false if the pool was already closed.
    pub(super) fn close(&self) -> bool {
        let (idle, waiting, drained) = {
            let mut inner = self.lock();
            if inner.closed {
                return false;
            }

            inner.closed = true;
            let idle = std::mem::take(&mut inner.idle);
            inner.counters.destroyed += idle.len() as u64;
            let waiting = std::mem::take(&mut inner.waiting);
            (idle, waiting, inner.drained())
        };

        self.shutdown.notify_one();

        for waiter in waiting {
            let _ = waiter.send(Err(Error::PoolClosed));
        }

        for live in idle {
            self.close_live(live, "pool closed");
        }

        if drained {
            self.drained.notify_waiters();
        }

        true
    }

    /// Close connections idle for longer than `max_idle`, one at a time,
    /// without going below `init_size`.
    pub(super) fn reap_idle(&self, now: Instant) -> usize {
        let max_idle = self.options.max_idle;
        let floor = self.options.init_size;
        let mut reaped = 0;

        loop {
            let victim = {
                let mut inner = self.lock();
                if inner.closed || inner.total() <= floor {
                    break;
                }

                match inner
                    .idle
                    .iter()
                    .position(|live| live.state == State::Idle && live.idle_for(now) > max_idle)
                {
                    Some(pos) => {
                        inner.counters.reaped += 1;
                        inner.counters.destroyed += 1;
                        inner.idle.remove(pos)
                    }
                    None => break,
                }
            };

            self.close_live(victim, "idle timeout");
            reaped += 1;
        }

        reaped
    }

    pub(super) fn record_timeout(&self) {
        self.lock().counters.acquire_timeouts += 1;
    }

    pub(super) fn record_dial_failure(&self) {
        self.lock().counters.dial_failures += 1;
    }

    pub(super) fn record_invalid_release(&self) {
        self.lock().counters.invalid_releases += 1;
    }

    fn reject(&self, live: Live<C>) -> Error {
        let err = Error::InvalidRelease {
            id: live.id,
            pool: self.id,
        };
        warn!("{}, closing it", err);
        self.close_live(live, "untracked");
        err
    }

    fn close_live(&self, live: Live<C>, reason: &str) {
        let Live {
            id,
            conn,
            created_at,
            ..
        } = live;

        match conn.close() {
            Ok(()) => debug!(
                "closed connection {} after {:?} ({}) [pool {}]",
                id,
                created_at.elapsed(),
                reason,
                self.id
            ),
            Err(err) => warn!(
                "failed to close connection {} ({}): {} [pool {}]",
                id, reason, err, self.id
            ),
        }
    }
}

impl<C: Connection> Drop for Shared<C> {
    fn drop(&mut self) {
        let idle = std::mem::take(&mut self.inner.get_mut().idle);
        for live in idle {
            self.close_live(live, "pool dropped");
        }
    }
}
