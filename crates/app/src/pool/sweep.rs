//! Idle connection sweep.

use std::{sync::Weak, time::Duration};

use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ManageConnection, SharedPool};

/// Sweep the idle set every `every` until the pool shuts down or is dropped.
pub(super) async fn run<M: ManageConnection>(
    pool: Weak<SharedPool<M>>,
    every: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // First tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                debug!("pool sweep stopped");
                return;
            }
            _ = ticker.tick() => {}
        }

        let Some(pool) = pool.upgrade() else {
            return;
        };

        let (expired, failed) = pool.sweep().await;

        if expired > 0 || failed > 0 {
            info!(expired, failed, total = pool.lock().total, "swept idle connections");
        }
    }
}

impl<M: ManageConnection> SharedPool<M> {
    /// Close idle connections past the idle timeout, then probe the rest.
    ///
    /// Each probe holds a capacity permit so the connection under test still
    /// counts against the ceiling. Checked-out connections are never visited.
    pub(super) async fn sweep(&self) -> (usize, usize) {
        let started = Instant::now();
        let idle_timeout = self.settings.idle_timeout;

        let expired: Vec<_> = {
            let mut state = self.lock();
            let mut expired = Vec::new();
            let mut kept = Vec::with_capacity(state.idle.len());

            for idle in state.idle.drain(..) {
                if started.duration_since(idle.last_used) >= idle_timeout {
                    expired.push(idle.conn);
                } else {
                    kept.push(idle);
                }
            }

            state.idle.extend(kept);
            state.total -= expired.len();

            expired
        };

        let expired_count = expired.len();

        for conn in expired {
            self.manager.close(conn).await;
        }

        let mut failed = 0;

        loop {
            let Ok(_permit) = self.capacity.try_acquire() else {
                break;
            };

            let candidate = {
                let mut state = self.lock();

                state
                    .idle
                    .iter()
                    .position(|idle| idle.last_checked < started)
                    .and_then(|index| state.idle.remove(index))
            };

            let Some(mut idle) = candidate else {
                break;
            };

            match self.manager.is_valid(&mut idle.conn).await {
                Ok(()) => {
                    idle.last_checked = Instant::now();

                    let mut state = self.lock();

                    if state.closed {
                        state.total = state.total.saturating_sub(1);
                    } else {
                        let index = state
                            .idle
                            .partition_point(|other| other.last_used <= idle.last_used);
                        state.idle.insert(index, idle);
                    }
                }
                Err(error) => {
                    warn!(error = %error, "closing idle connection that failed its probe");
                    failed += 1;
                    self.discard(idle.conn).await;
                }
            }
        }

        (expired_count, failed)
    }
}
