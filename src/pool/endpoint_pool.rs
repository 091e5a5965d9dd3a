//! Bounded connection pool for one endpoint.
//!
//! # Responsibilities
//! - Enforce the in-use bound with a fair semaphore (FIFO waiters)
//! - Keep idle connections and the open count under one short-held mutex
//! - Open new connections with bounded, backed-off retries
//! - Drop expired, stale and unhealthy connections

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::backend::{BackendConnection, Endpoint};
use crate::error::{GatewayError, GatewayResult};
use crate::observability::metrics;
use crate::pool::{PoolSettings, PoolStats, PooledConnection};
use crate::resilience::backoff::calculate_backoff;
use crate::resilience::timeouts::acquire_within;

#[derive(Debug, Default)]
struct PoolInner {
    idle: VecDeque<BackendConnection>,
    /// Idle + leased + being opened. Never exceeds the bound.
    open: usize,
    in_use: usize,
    closed: bool,
}

/// Connections for a single endpoint.
#[derive(Debug)]
pub struct EndpointPool {
    endpoint: Arc<Endpoint>,
    permits: Arc<Semaphore>,
    inner: Mutex<PoolInner>,
    settings: PoolSettings,
}

/// Undoes an `open` slot reservation if the connect is abandoned or fails.
struct OpenReservation<'a> {
    pool: &'a EndpointPool,
    armed: bool,
}

impl OpenReservation<'_> {
    fn commit(mut self) {
        self.armed = false;
    }
}

impl Drop for OpenReservation<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut inner = self.pool.lock();
            inner.open = inner.open.saturating_sub(1);
        }
    }
}

impl EndpointPool {
    pub fn new(endpoint: Arc<Endpoint>, settings: PoolSettings) -> Self {
        let max = endpoint.max_connections;
        Self {
            endpoint,
            permits: Arc::new(Semaphore::new(max)),
            inner: Mutex::new(PoolInner::default()),
            settings,
        }
    }

    pub fn endpoint(&self) -> &Arc<Endpoint> {
        &self.endpoint
    }

    fn name(&self) -> &str {
        &self.endpoint.name
    }

    fn lock(&self) -> MutexGuard<'_, PoolInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lease a connection: reuse an idle one, open a new one, or wait for a release.
    pub async fn acquire(self: &Arc<Self>) -> GatewayResult<PooledConnection> {
        let started = Instant::now();
        let permit = acquire_within(self.name(), self.settings.acquire_timeout, async {
            self.permits
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| GatewayError::Shutdown)
        })
        .await?;
        metrics::record_acquire_wait(self.name(), started.elapsed());

        loop {
            let candidate = {
                let mut inner = self.lock();
                if inner.closed {
                    return Err(GatewayError::Shutdown);
                }
                match inner.idle.pop_back() {
                    Some(conn) => Some(conn),
                    None => {
                        inner.open += 1;
                        None
                    }
                }
            };

            let Some(conn) = candidate else {
                break;
            };
            if conn.is_expired(self.settings.idle_timeout) {
                self.drop_idle(conn, "expired");
                continue;
            }
            if !conn.probe_alive() {
                self.drop_idle(conn, "stale");
                continue;
            }

            tracing::trace!(endpoint = %self.name(), connection_id = %conn.id(), "Reusing idle connection");
            return Ok(self.lease(conn, permit));
        }

        let reservation = OpenReservation {
            pool: &**self,
            armed: true,
        };
        let conn = self.open_connection().await?;
        reservation.commit();
        Ok(self.lease(conn, permit))
    }

    async fn open_connection(&self) -> GatewayResult<BackendConnection> {
        let attempts = self.settings.connect_retries.saturating_add(1);
        let mut last_error = String::new();

        for attempt in 0..attempts {
            let delay = calculate_backoff(
                attempt,
                self.settings.retry_base_delay_ms,
                self.settings.retry_max_delay_ms,
            );
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match BackendConnection::connect(&self.endpoint, self.settings.connect_timeout).await {
                Ok(conn) => {
                    self.endpoint.mark_success();
                    metrics::record_connection_opened(self.name());
                    return Ok(conn);
                }
                Err(e) => {
                    tracing::debug!(
                        endpoint = %self.name(),
                        attempt = attempt + 1,
                        attempts,
                        error = %e,
                        "Connect attempt failed"
                    );
                    last_error = e.to_string();
                }
            }
        }

        self.endpoint.mark_failure();
        tracing::warn!(
            endpoint = %self.name(),
            address = %self.endpoint.address,
            attempts,
            error = %last_error,
            "Endpoint unreachable"
        );
        Err(GatewayError::Connectivity {
            endpoint: self.name().to_string(),
            reason: last_error,
        })
    }

    fn lease(self: &Arc<Self>, mut conn: BackendConnection, permit: OwnedSemaphorePermit) -> PooledConnection {
        conn.set_in_use(true);
        let (in_use, idle) = {
            let mut inner = self.lock();
            inner.in_use += 1;
            (inner.in_use, inner.idle.len())
        };
        metrics::record_pool_occupancy(self.name(), in_use, idle);
        PooledConnection::new(conn, Arc::clone(self), permit)
    }

    /// Take back a leased connection. `discard` names why it must be closed, if it must.
    pub(crate) fn give_back(&self, mut conn: BackendConnection, discard: Option<&'static str>) {
        conn.set_in_use(false);
        let discard = discard.or(if conn.is_healthy() { None } else { Some("unhealthy") });

        let (dropped, in_use, idle) = {
            let mut inner = self.lock();
            inner.in_use = inner.in_use.saturating_sub(1);
            let reason = discard.or(if inner.closed { Some("shutdown") } else { None });
            let dropped = match reason {
                None => {
                    inner.idle.push_back(conn);
                    None
                }
                Some(reason) => {
                    inner.open = inner.open.saturating_sub(1);
                    Some((conn, reason))
                }
            };
            (dropped, inner.in_use, inner.idle.len())
        };

        if let Some((conn, reason)) = dropped {
            self.close_connection(conn, reason);
        }
        metrics::record_pool_occupancy(self.name(), in_use, idle);
    }

    /// Close a connection already removed from the idle set.
    fn drop_idle(&self, conn: BackendConnection, reason: &'static str) {
        {
            let mut inner = self.lock();
            inner.open = inner.open.saturating_sub(1);
        }
        self.close_connection(conn, reason);
    }

    fn close_connection(&self, conn: BackendConnection, reason: &'static str) {
        tracing::debug!(
            endpoint = %self.name(),
            connection_id = %conn.id(),
            reason,
            "Closing backend connection"
        );
        metrics::record_connection_discarded(self.name(), reason);
        drop(conn);
    }

    /// Close idle connections that are expired or whose peer hung up.
    pub fn reap_idle(&self) -> usize {
        let (victims, in_use, idle) = {
            let mut inner = self.lock();
            let mut victims = Vec::new();
            let drained: Vec<BackendConnection> = inner.idle.drain(..).collect();
            for conn in drained {
                if conn.is_expired(self.settings.idle_timeout) {
                    victims.push((conn, "expired"));
                } else if !conn.probe_alive() {
                    victims.push((conn, "stale"));
                } else {
                    inner.idle.push_back(conn);
                }
            }
            inner.open = inner.open.saturating_sub(victims.len());
            (victims, inner.in_use, inner.idle.len())
        };

        let reaped = victims.len();
        for (conn, reason) in victims {
            self.close_connection(conn, reason);
        }
        if reaped > 0 {
            metrics::record_pool_occupancy(self.name(), in_use, idle);
        }
        reaped
    }

    /// Refuse further acquires and close every idle connection.
    pub fn close(&self) {
        let drained: Vec<BackendConnection> = {
            let mut inner = self.lock();
            inner.closed = true;
            let drained: Vec<_> = inner.idle.drain(..).collect();
            inner.open = inner.open.saturating_sub(drained.len());
            drained
        };
        self.permits.close();
        for conn in drained {
            self.close_connection(conn, "shutdown");
        }
    }

    pub fn stats(&self) -> PoolStats {
        let inner = self.lock();
        PoolStats {
            endpoint: self.endpoint.name.clone(),
            in_use: inner.in_use,
            idle: inner.idle.len(),
            open: inner.open,
            max: self.endpoint.max_connections,
        }
    }
}
