//! Backend connection pooling.
//!
//! # Data Flow
//! ```text
//! SharedHandler::process
//!     → ConnectionPool::checkout
//!         → LoadBalancer::candidates (live endpoints, round-robin order)
//!         → EndpointPool::acquire (permit → idle pop or connect with retries)
//!         → Connectivity error: fail over to the next candidate
//!     → PooledConnection (lease) owned by the request
//!     → release(healthy) → idle set | discard → closed
//!
//! reaper.rs (background):
//!     every reap_interval → reap_idle → close expired / stale idle connections
//! ```
//!
//! # Design Decisions
//! - One fair semaphore per endpoint: waiters are served in arrival order
//! - Idle set and counters live under a std mutex never held across `.await`
//! - Idle reuse is LIFO; the warmest connection goes out first
//! - Dropping a lease without releasing it discards the connection

pub mod endpoint_pool;
pub mod lease;
pub mod reaper;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::backend::Endpoint;
use crate::config::GatewayConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::load_balancer::{LoadBalancer, RoundRobin};

pub use endpoint_pool::EndpointPool;
pub use lease::PooledConnection;

/// Pool tunables derived from config.
#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    pub idle_timeout: Duration,
    pub acquire_timeout: Duration,
    pub connect_timeout: Duration,
    pub connect_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
}

impl PoolSettings {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            idle_timeout: config.pool.idle_timeout(),
            acquire_timeout: config.pool.acquire_timeout(),
            connect_timeout: config.timeouts.connect(),
            connect_retries: config.pool.connect_retries,
            retry_base_delay_ms: config.pool.retry_base_delay_ms,
            retry_max_delay_ms: config.pool.retry_max_delay_ms,
        }
    }
}

/// Snapshot of one endpoint pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    pub endpoint: String,
    pub in_use: usize,
    pub idle: usize,
    pub open: usize,
    pub max: usize,
}

/// All endpoint pools plus endpoint selection.
#[derive(Debug)]
pub struct ConnectionPool {
    endpoints: Vec<Arc<Endpoint>>,
    pools: Vec<Arc<EndpointPool>>,
    balancer: Box<dyn LoadBalancer>,
    reap_interval: Duration,
    closed: AtomicBool,
}

impl ConnectionPool {
    pub fn new(config: &GatewayConfig) -> Self {
        Self::with_balancer(config, Box::new(RoundRobin::new()))
    }

    pub fn with_balancer(config: &GatewayConfig, balancer: Box<dyn LoadBalancer>) -> Self {
        let settings = PoolSettings::from_config(config);
        let endpoints: Vec<Arc<Endpoint>> = config
            .backends
            .iter()
            .map(|backend| Arc::new(Endpoint::new(backend, &config.health)))
            .collect();
        let pools = endpoints
            .iter()
            .map(|endpoint| Arc::new(EndpointPool::new(Arc::clone(endpoint), settings)))
            .collect();

        Self {
            endpoints,
            pools,
            balancer,
            reap_interval: config.pool.reap_interval(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn endpoints(&self) -> &[Arc<Endpoint>] {
        &self.endpoints
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Lease a connection to the endpoint at `endpoint_index`.
    pub async fn acquire(&self, endpoint_index: usize) -> GatewayResult<PooledConnection> {
        if self.is_closed() {
            return Err(GatewayError::Shutdown);
        }
        let pool = self
            .pools
            .get(endpoint_index)
            .ok_or_else(|| GatewayError::Connectivity {
                endpoint: format!("#{endpoint_index}"),
                reason: "no such endpoint".to_string(),
            })?;
        pool.acquire().await
    }

    /// Lease a connection to some live endpoint, failing over on connectivity errors.
    pub async fn checkout(&self) -> GatewayResult<PooledConnection> {
        if self.is_closed() {
            return Err(GatewayError::Shutdown);
        }

        let candidates = self.balancer.candidates(&self.endpoints);
        let mut last_error = None;
        for index in candidates {
            match self.acquire(index).await {
                Ok(lease) => return Ok(lease),
                Err(e @ GatewayError::Connectivity { .. }) => {
                    tracing::warn!(endpoint = %self.endpoints[index].name, error = %e, "Failing over to next endpoint");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| GatewayError::Connectivity {
            endpoint: "*".to_string(),
            reason: "no live endpoint".to_string(),
        }))
    }

    /// Hand a lease back; see [`PooledConnection::release`].
    pub fn release(&self, lease: PooledConnection, healthy: bool) {
        lease.release(healthy);
    }

    /// Open one connection to some endpoint and park it idle.
    pub async fn prewarm(&self) -> GatewayResult<()> {
        let lease = self.checkout().await?;
        tracing::info!(
            endpoint = %lease.endpoint(),
            connection_id = %lease.id(),
            "Pool prewarmed"
        );
        lease.release(true);
        Ok(())
    }

    /// Close expired or stale idle connections on every endpoint.
    pub fn reap_idle(&self) -> usize {
        self.pools.iter().map(|pool| pool.reap_idle()).sum()
    }

    /// Start the background reaper; it stops when `shutdown` fires.
    pub fn spawn_reaper(self: &Arc<Self>, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        reaper::spawn_reaper(Arc::clone(self), self.reap_interval, shutdown)
    }

    /// Close idle connections and fail pending and future acquires with `Shutdown`.
    ///
    /// Connections still leased are closed when their lease ends.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        for pool in &self.pools {
            pool.close();
        }
        tracing::info!("Connection pool closed");
    }

    pub fn stats(&self) -> Vec<PoolStats> {
        self.pools.iter().map(|pool| pool.stats()).collect()
    }
}
