//! Bounded async connection pool.
//!
//! The pool keeps a warm set of live connections, grows lazily up to a hard
//! ceiling and hands connections out behind a [`PooledConnection`] guard that
//! puts them back when dropped. Capacity is a semaphore with one permit per
//! allowed connection, so a caller holding a guard always holds a permit and the
//! ceiling can never be exceeded. A background sweep closes idle connections
//! that have aged out or stopped answering the liveness probe.

use std::{
    collections::VecDeque,
    fmt::{Debug, Formatter, Result as FmtResult},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use serde::Serialize;
use tokio::{
    sync::Semaphore,
    time::{self, Instant},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PoolConfig;

mod errors;
mod guard;
mod sweep;

pub use errors::PoolError;
pub use guard::PooledConnection;

/// Opens, probes and closes backend connections on behalf of a [`Pool`].
#[async_trait]
pub trait ManageConnection: Send + Sync + 'static {
    type Connection: Send + 'static;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Open a new connection.
    async fn connect(&self) -> Result<Self::Connection, Self::Error>;

    /// Cheap round trip proving the connection is still usable.
    async fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error>;

    /// Synchronous check run when a connection is returned.
    fn has_broken(&self, conn: &mut Self::Connection) -> bool;

    /// Close a connection that leaves the pool.
    async fn close(&self, conn: Self::Connection) {
        drop(conn);
    }
}

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub total: usize,
    pub active: usize,
    pub available: usize,
    pub max: usize,
}

#[derive(Debug, Clone, Copy)]
struct PoolSettings {
    min_idle: usize,
    max_size: usize,
    acquire_timeout: Duration,
    idle_timeout: Duration,
    sweep_interval: Duration,
}

/// Configures and opens a [`Pool`].
#[derive(Debug, Clone, Copy)]
pub struct PoolBuilder {
    settings: PoolSettings,
}

impl Default for PoolBuilder {
    fn default() -> Self {
        Self::from_config(&PoolConfig::default())
    }
}

impl PoolBuilder {
    #[must_use]
    pub fn from_config(config: &PoolConfig) -> Self {
        Self {
            settings: PoolSettings {
                min_idle: config.min_idle,
                max_size: config.max_size,
                acquire_timeout: config.acquire_timeout(),
                idle_timeout: config.idle_timeout(),
                sweep_interval: config.sweep_interval(),
            },
        }
    }

    #[must_use]
    pub fn min_idle(mut self, min_idle: usize) -> Self {
        self.settings.min_idle = min_idle;
        self
    }

    #[must_use]
    pub fn max_size(mut self, max_size: usize) -> Self {
        self.settings.max_size = max_size;
        self
    }

    #[must_use]
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.settings.acquire_timeout = timeout;
        self
    }

    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.settings.idle_timeout = timeout;
        self
    }

    /// A zero interval disables the background sweep.
    #[must_use]
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.settings.sweep_interval = interval;
        self
    }

    /// Open the warm set and start the idle sweep.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConfig`] for a zero-sized pool and
    /// [`PoolError::Connect`] when not a single warm connection could be opened.
    pub async fn build<M: ManageConnection>(self, manager: M) -> Result<Pool<M>, PoolError> {
        let mut settings = self.settings;

        if settings.max_size == 0 {
            return Err(PoolError::InvalidConfig("max_size must be at least 1"));
        }

        settings.min_idle = settings.min_idle.min(settings.max_size);

        let mut idle = VecDeque::with_capacity(settings.max_size);
        let mut last_error = None;

        for _ in 0..settings.min_idle {
            match manager.connect().await {
                Ok(conn) => idle.push_back(IdleConnection::new(conn)),
                Err(error) => {
                    warn!(error = %error, "failed to open warm pool connection");
                    last_error = Some(error);
                }
            }
        }

        if idle.is_empty()
            && let Some(error) = last_error
        {
            return Err(PoolError::Connect(Box::new(error)));
        }

        let total = idle.len();

        let shared = Arc::new(SharedPool {
            manager,
            settings,
            state: Mutex::new(PoolState {
                idle,
                total,
                active: 0,
                closed: false,
            }),
            capacity: Arc::new(Semaphore::new(settings.max_size)),
            shutdown: CancellationToken::new(),
        });

        if !settings.sweep_interval.is_zero() {
            tokio::spawn(sweep::run(
                Arc::downgrade(&shared),
                settings.sweep_interval,
                shared.shutdown.clone(),
            ));
        }

        info!(
            warm = total,
            max = settings.max_size,
            "connection pool ready"
        );

        Ok(Pool { shared })
    }
}

/// Cheaply clonable handle to a shared connection pool.
pub struct Pool<M: ManageConnection> {
    shared: Arc<SharedPool<M>>,
}

impl<M: ManageConnection> Clone for Pool<M> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<M: ManageConnection> Debug for Pool<M> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Pool")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl<M: ManageConnection> Pool<M> {
    /// Borrow a connection, waiting up to the configured acquire timeout.
    ///
    /// # Errors
    ///
    /// See [`Pool::acquire_timeout`].
    pub async fn acquire(&self) -> Result<PooledConnection<M>, PoolError> {
        self.acquire_timeout(self.shared.settings.acquire_timeout)
            .await
    }

    /// Borrow a connection, waiting at most `timeout`.
    ///
    /// Idle connections are reused most-recently-used first. When none is idle a
    /// new connection is opened. Every candidate is probed before it is handed
    /// out; one that fails is closed and the next candidate is tried.
    ///
    /// # Errors
    ///
    /// - [`PoolError::Timeout`] when no connection became available in time.
    /// - [`PoolError::Closed`] once [`Pool::shutdown`] has been called.
    /// - [`PoolError::Connect`] when opening a new connection fails.
    /// - [`PoolError::Unhealthy`] when every attempt failed its probe.
    pub async fn acquire_timeout(
        &self,
        timeout: Duration,
    ) -> Result<PooledConnection<M>, PoolError> {
        let shared = &self.shared;
        let deadline = Instant::now() + timeout;

        let permit = match time::timeout_at(deadline, Arc::clone(&shared.capacity).acquire_owned())
            .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_closed)) => return Err(PoolError::Closed),
            Err(_elapsed) => {
                debug!(timeout_ms = timeout.as_millis(), "pool acquire timed out");
                return Err(PoolError::Timeout(timeout));
            }
        };

        let attempts = shared.settings.max_size + 1;

        for attempt in 1..=attempts {
            let checkout = shared.checkout()?;
            let slot = Reservation::new(shared);

            let mut conn = match checkout {
                Checkout::Idle(conn) => conn,
                Checkout::Open => shared.open(deadline, timeout).await?,
            };

            match time::timeout_at(deadline, shared.manager.is_valid(&mut conn)).await {
                Ok(Ok(())) => {
                    slot.claim();

                    return Ok(PooledConnection::new(Arc::clone(shared), conn, permit));
                }
                Ok(Err(error)) => {
                    warn!(attempt, error = %error, "discarding connection that failed its probe");
                    slot.discard(conn).await;
                }
                Err(_elapsed) => {
                    slot.discard(conn).await;

                    return Err(PoolError::Timeout(timeout));
                }
            }
        }

        Err(PoolError::Unhealthy { attempts })
    }

    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let state = self.shared.lock();

        PoolStatus {
            total: state.total,
            active: state.active,
            available: state.idle.len(),
            max: self.shared.settings.max_size,
        }
    }

    /// Stop the sweep, close every idle connection and fail pending acquires.
    ///
    /// Connections still checked out are closed when their guards drop.
    pub async fn shutdown(&self) {
        let drained: Vec<_> = {
            let mut state = self.shared.lock();

            if state.closed {
                return;
            }

            state.closed = true;

            let drained: Vec<_> = state.idle.drain(..).collect();
            state.total -= drained.len();

            drained
        };

        self.shared.shutdown.cancel();
        self.shared.capacity.close();

        let closed = drained.len();

        for idle in drained {
            self.shared.manager.close(idle.conn).await;
        }

        info!(closed, "connection pool shut down");
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }
}

struct IdleConnection<C> {
    conn: C,
    last_used: Instant,
    last_checked: Instant,
}

impl<C> IdleConnection<C> {
    fn new(conn: C) -> Self {
        let now = Instant::now();

        Self {
            conn,
            last_used: now,
            last_checked: now,
        }
    }
}

struct PoolState<C> {
    idle: VecDeque<IdleConnection<C>>,
    total: usize,
    active: usize,
    closed: bool,
}

enum Checkout<C> {
    Idle(C),
    Open,
}

/// A slot counted in `total` that no guard owns yet.
///
/// Dropped without [`Reservation::claim`], it gives the slot back, so an
/// acquire abandoned while connecting or probing leaves the counters balanced.
struct Reservation<'a, M: ManageConnection> {
    shared: &'a SharedPool<M>,
    claimed: bool,
}

impl<'a, M: ManageConnection> Reservation<'a, M> {
    fn new(shared: &'a SharedPool<M>) -> Self {
        Self {
            shared,
            claimed: false,
        }
    }

    /// Hand the slot to a guard as an active connection.
    fn claim(mut self) {
        self.shared.lock().active += 1;
        self.claimed = true;
    }

    /// Give the slot back and close the connection that held it.
    async fn discard(self, conn: M::Connection) {
        let shared = self.shared;
        drop(self);

        shared.manager.close(conn).await;
    }
}

impl<M: ManageConnection> Drop for Reservation<'_, M> {
    fn drop(&mut self) {
        if !self.claimed {
            self.shared.forget_one();
        }
    }
}

pub(crate) struct SharedPool<M: ManageConnection> {
    manager: M,
    settings: PoolSettings,
    state: Mutex<PoolState<M::Connection>>,
    capacity: Arc<Semaphore>,
    shutdown: CancellationToken,
}

impl<M: ManageConnection> Drop for SharedPool<M> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl<M: ManageConnection> SharedPool<M> {
    fn lock(&self) -> MutexGuard<'_, PoolState<M::Connection>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take the most recently used idle connection, or reserve a slot for a new one.
    ///
    /// Either way the caller now owns one unit of `total` and must wrap it in a
    /// [`Reservation`] before the next await. The caller holds a capacity
    /// permit, so reserving never pushes `total` past `max_size`.
    fn checkout(&self) -> Result<Checkout<M::Connection>, PoolError> {
        let mut state = self.lock();

        if state.closed {
            return Err(PoolError::Closed);
        }

        if let Some(idle) = state.idle.pop_back() {
            return Ok(Checkout::Idle(idle.conn));
        }

        state.total += 1;

        Ok(Checkout::Open)
    }

    async fn open(&self, deadline: Instant, timeout: Duration) -> Result<M::Connection, PoolError> {
        match time::timeout_at(deadline, self.manager.connect()).await {
            Ok(Ok(conn)) => {
                debug!(total = self.lock().total, "opened pool connection");

                Ok(conn)
            }
            Ok(Err(error)) => {
                warn!(error = %error, "failed to open pool connection");

                Err(PoolError::Connect(Box::new(error)))
            }
            Err(_elapsed) => Err(PoolError::Timeout(timeout)),
        }
    }

    fn forget_one(&self) {
        let mut state = self.lock();
        state.total = state.total.saturating_sub(1);
    }

    async fn discard(&self, conn: M::Connection) {
        self.forget_one();
        self.manager.close(conn).await;
    }

    /// Return a connection from a dropped guard.
    fn check_in(&self, conn: M::Connection, broken: bool) {
        let rejected = {
            let mut state = self.lock();
            state.active = state.active.saturating_sub(1);

            if broken || state.closed {
                state.total = state.total.saturating_sub(1);
                Some(conn)
            } else {
                state.idle.push_back(IdleConnection::new(conn));
                None
            }
        };

        if rejected.is_some() {
            debug!(broken, "dropped returned connection");
        }
    }
}
