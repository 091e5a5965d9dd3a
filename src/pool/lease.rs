//! Request-scoped ownership of one pooled connection.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use tokio::sync::OwnedSemaphorePermit;

use crate::backend::BackendConnection;
use crate::pool::endpoint_pool::EndpointPool;

/// A RAII guard over one checked-out connection and its capacity permit.
///
/// `release(true)` parks the connection in the idle set. `release(false)` and
/// plain `drop` close it. The permit is returned only after the connection has
/// been handed back, so the next waiter observes it in the idle set.
#[derive(Debug)]
pub struct PooledConnection {
    /// `None` only between an explicit release and the end of `drop`.
    conn: Option<BackendConnection>,
    pool: Arc<EndpointPool>,
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    pub(crate) fn new(
        conn: BackendConnection,
        pool: Arc<EndpointPool>,
        permit: OwnedSemaphorePermit,
    ) -> Self {
        Self {
            conn: Some(conn),
            pool,
            _permit: permit,
        }
    }

    /// Hand the connection back. It is reused only if `healthy` and still marked healthy.
    pub fn release(mut self, healthy: bool) {
        if let Some(conn) = self.conn.take() {
            let reason = if healthy { None } else { Some("unhealthy") };
            self.pool.give_back(conn, reason);
        }
    }
}

impl Deref for PooledConnection {
    type Target = BackendConnection;

    fn deref(&self) -> &Self::Target {
        match &self.conn {
            Some(conn) => conn,
            None => unreachable!("lease emptied before drop"),
        }
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.conn {
            Some(conn) => conn,
            None => unreachable!("lease emptied before drop"),
        }
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.give_back(conn, Some("abandoned"));
        }
    }
}
