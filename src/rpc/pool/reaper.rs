//! Background task closing connections that sat idle for too long.

use std::sync::{Arc, Weak};

use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::debug;

use super::connection::Connection;
use super::inner::Shared;

/// Spawn the reaper for a pool.
///
/// The task holds only a weak reference, so it exits when the pool is
/// closed or the last handle to it is dropped.
pub(super) fn spawn<C: Connection>(shared: &Arc<Shared<C>>) -> JoinHandle<()> {
    let weak: Weak<Shared<C>> = Arc::downgrade(shared);
    let shutdown = shared.shutdown_signal();
    let period = shared.options().reap_interval;
    let pool_id = shared.id();

    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => (),
                _ = shutdown.notified() => break,
            }

            let Some(shared) = weak.upgrade() else {
                break;
            };

            if shared.lock().closed {
                break;
            }

            let reaped = shared.reap_idle(Instant::now());
            if reaped > 0 {
                debug!("reaped {} idle connections [pool {}]", reaped, pool_id);
            }
        }

        debug!("idle reaper stopped [pool {}]", pool_id);
    })
}
