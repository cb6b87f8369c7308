//! Scoped connection guard.

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    ops::{Deref, DerefMut},
    sync::Arc,
};

use tokio::sync::OwnedSemaphorePermit;

use super::{ManageConnection, SharedPool};

/// A connection borrowed from a [`Pool`](super::Pool).
///
/// Dropping the guard hands the connection back exactly once. A connection that
/// failed a probe, was marked broken, or outlived the pool is closed instead.
pub struct PooledConnection<M: ManageConnection> {
    pool: Arc<SharedPool<M>>,
    conn: Option<M::Connection>,
    broken: bool,
    _permit: OwnedSemaphorePermit,
}

impl<M: ManageConnection> PooledConnection<M> {
    pub(super) fn new(
        pool: Arc<SharedPool<M>>,
        conn: M::Connection,
        permit: OwnedSemaphorePermit,
    ) -> Self {
        Self {
            pool,
            conn: Some(conn),
            broken: false,
            _permit: permit,
        }
    }

    /// Probe the connection. A failed probe marks it broken.
    pub async fn is_valid(&mut self) -> bool {
        let valid = match self.conn.as_mut() {
            Some(conn) => self.pool.manager.is_valid(conn).await.is_ok(),
            None => false,
        };

        if !valid {
            self.broken = true;
        }

        valid
    }

    /// Close the connection instead of returning it to the pool.
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    /// Hand the connection back now rather than at end of scope.
    pub fn release(self) {
        drop(self);
    }
}

impl<M: ManageConnection> Deref for PooledConnection<M> {
    type Target = M::Connection;

    fn deref(&self) -> &Self::Target {
        self.conn
            .as_ref()
            .expect("connection is present until the guard drops")
    }
}

impl<M: ManageConnection> DerefMut for PooledConnection<M> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn
            .as_mut()
            .expect("connection is present until the guard drops")
    }
}

impl<M: ManageConnection> Debug for PooledConnection<M> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("PooledConnection")
            .field("broken", &self.broken)
            .finish_non_exhaustive()
    }
}

impl<M: ManageConnection> Drop for PooledConnection<M> {
    fn drop(&mut self) {
        let Some(mut conn) = self.conn.take() else {
            return;
        };

        let broken = self.broken || self.pool.manager.has_broken(&mut conn);

        // The permit is a later field, so it is released after the connection
        // is back in the idle set.
        self.pool.check_in(conn, broken);
    }
}
