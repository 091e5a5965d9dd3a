//! Application-server endpoint and its passive health.
//!
//! # State Transitions
//! ```text
//! Healthy → Dead:        consecutive connect failures >= unhealthy_threshold
//! Dead → Recovering:     fail_recover elapsed (endpoint selectable again)
//! Recovering → Healthy:  next successful connect
//! Recovering → Dead:     next failed connect
//! ```

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::{BackendConfig, HealthConfig};
use crate::observability::metrics;

/// Health state of an endpoint.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Healthy = 0,
    Dead = 1,
    Recovering = 2,
}

impl From<u8> for HealthState {
    fn from(val: u8) -> Self {
        match val {
            1 => HealthState::Dead,
            2 => HealthState::Recovering,
            _ => HealthState::Healthy,
        }
    }
}

/// A single application-server instance.
#[derive(Debug)]
pub struct Endpoint {
    /// Name used in logs and metric labels.
    pub name: String,
    /// `host:port` to connect to.
    pub address: String,
    /// Pool bound for this endpoint.
    pub max_connections: usize,

    state: AtomicU8,
    consecutive_failures: AtomicU32,
    dead_until: Mutex<Option<Instant>>,
    unhealthy_threshold: u32,
    fail_recover: Duration,
}

impl Endpoint {
    pub fn new(config: &BackendConfig, health: &HealthConfig) -> Self {
        Self {
            name: config.name.clone(),
            address: config.address.clone(),
            max_connections: config.max_connections,
            state: AtomicU8::new(HealthState::Healthy as u8),
            consecutive_failures: AtomicU32::new(0),
            dead_until: Mutex::new(None),
            unhealthy_threshold: health.unhealthy_threshold.max(1),
            fail_recover: health.fail_recover(),
        }
    }

    pub fn state(&self) -> HealthState {
        HealthState::from(self.state.load(Ordering::Acquire))
    }

    /// Whether selection may route to this endpoint.
    ///
    /// A dead endpoint whose recover time has passed moves to `Recovering`.
    pub fn is_live(&self) -> bool {
        if self.state() != HealthState::Dead {
            return true;
        }
        let Ok(mut dead_until) = self.dead_until.lock() else {
            return true;
        };
        match *dead_until {
            Some(until) if Instant::now() < until => false,
            _ => {
                *dead_until = None;
                self.state
                    .store(HealthState::Recovering as u8, Ordering::Release);
                tracing::info!(endpoint = %self.name, "Endpoint recover time elapsed, probing again");
                true
            }
        }
    }

    /// Record a successful connect.
    pub fn mark_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        let previous = self.state.swap(HealthState::Healthy as u8, Ordering::AcqRel);
        if HealthState::from(previous) != HealthState::Healthy {
            tracing::info!(endpoint = %self.name, "Endpoint healthy");
            metrics::record_endpoint_health(&self.name, true);
        }
    }

    /// Record a connect that failed after all retries.
    pub fn mark_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        let recovering = self.state() == HealthState::Recovering;
        if failures < self.unhealthy_threshold && !recovering {
            return;
        }

        if let Ok(mut dead_until) = self.dead_until.lock() {
            *dead_until = Some(Instant::now() + self.fail_recover);
        }
        let previous = self.state.swap(HealthState::Dead as u8, Ordering::AcqRel);
        if HealthState::from(previous) != HealthState::Dead {
            tracing::warn!(
                endpoint = %self.name,
                failures,
                recover_secs = self.fail_recover.as_secs(),
                "Endpoint marked dead"
            );
            metrics::record_endpoint_health(&self.name, false);
        }
    }
}
