//! Round-robin endpoint selection.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::backend::Endpoint;
use crate::load_balancer::LoadBalancer;

/// Round-robin selector.
/// Stores an internal counter to rotate through endpoints.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancer for RoundRobin {
    fn candidates(&self, endpoints: &[Arc<Endpoint>]) -> Vec<usize> {
        if endpoints.is_empty() {
            return Vec::new();
        }

        let start = self.counter.fetch_add(1, Ordering::Relaxed);
        let len = endpoints.len();

        (0..len)
            .map(|i| (start + i) % len)
            .filter(|&index| endpoints[index].is_live())
            .collect()
    }
}
