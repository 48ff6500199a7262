//! RPC endpoint pool
//!
//! Tracks health and latency of every configured endpoint and picks the
//! one calls should go to. Health transitions:
//!
//! ```text
//! UNKNOWN --success--> HEALTHY --N consecutive failures--> UNHEALTHY
//!    |                    ^                                    |
//!    +--N failures--------|-----------> UNHEALTHY              |
//!                         +------------successful probe--------+
//! ```

use std::fmt;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{mask_url, EndpointConfig};
use crate::error::{Error, Result};

/// EWMA weight given to the newest latency sample
const LATENCY_EWMA_ALPHA: f64 = 0.3;

/// Health state of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointHealth {
    Unknown,
    Healthy,
    Unhealthy,
}

impl fmt::Display for EndpointHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EndpointHealth::Unknown => "UNKNOWN",
            EndpointHealth::Healthy => "HEALTHY",
            EndpointHealth::Unhealthy => "UNHEALTHY",
        };
        f.write_str(s)
    }
}

/// A configured JSON-RPC endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct RpcEndpoint {
    /// Position in configuration order
    pub id: usize,
    pub name: String,
    pub url: String,
    pub credential: Option<String>,
    pub health: EndpointHealth,
    /// Smoothed latency of successful calls
    pub latency: Option<Duration>,
}

impl RpcEndpoint {
    /// URL to send requests to, credential attached as `api-key`
    pub fn request_url(&self) -> String {
        match &self.credential {
            Some(key) if !key.is_empty() => {
                let separator = if self.url.contains('?') { '&' } else { '?' };
                format!("{}{}api-key={}", self.url, separator, key)
            }
            _ => self.url.clone(),
        }
    }

    /// URL safe for logs
    pub fn display_url(&self) -> String {
        mask_url(&self.url)
    }
}

/// Result of a call as seen by the pool
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CallOutcome {
    Success { latency: Duration },
    /// Timeout or connection failure
    Failure,
    /// Rate limited; the endpoint is up, so health is untouched
    Throttled,
}

#[derive(Debug)]
struct EndpointState {
    endpoint: RpcEndpoint,
    consecutive_failures: u32,
    latency_ewma_ms: Option<f64>,
}

/// Pool of candidate endpoints with health tracking and failover
pub struct EndpointPool {
    endpoints: RwLock<Vec<EndpointState>>,
    failure_threshold: u32,
}

impl EndpointPool {
    /// Create a pool from configuration; every endpoint starts UNKNOWN
    pub fn new(configs: &[EndpointConfig], failure_threshold: u32) -> Self {
        let endpoints = configs
            .iter()
            .enumerate()
            .map(|(id, c)| EndpointState {
                endpoint: RpcEndpoint {
                    id,
                    name: c.name.clone(),
                    url: c.url.clone(),
                    credential: c.credential.clone(),
                    health: EndpointHealth::Unknown,
                    latency: None,
                },
                consecutive_failures: 0,
                latency_ewma_ms: None,
            })
            .collect::<Vec<_>>();

        info!("Endpoint pool initialized with {} endpoints", endpoints.len());

        Self {
            endpoints: RwLock::new(endpoints),
            failure_threshold: failure_threshold.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.read(|eps| eps.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Best endpoint: lowest latency among HEALTHY, then UNKNOWN, config order on ties
    pub fn select(&self) -> Result<RpcEndpoint> {
        self.select_excluding(&[])
    }

    /// Like [`select`](Self::select), skipping the given endpoint ids
    pub fn select_excluding(&self, excluded: &[usize]) -> Result<RpcEndpoint> {
        self.read(|eps| {
            eps.iter()
                .filter(|s| !excluded.contains(&s.endpoint.id))
                .filter(|s| s.endpoint.health != EndpointHealth::Unhealthy)
                .min_by(|a, b| {
                    rank(a)
                        .cmp(&rank(b))
                        .then_with(|| latency_key(a).total_cmp(&latency_key(b)))
                        .then_with(|| a.endpoint.id.cmp(&b.endpoint.id))
                })
                .map(|s| s.endpoint.clone())
                .ok_or(Error::NoHealthyEndpoint)
        })
    }

    /// Feed back the outcome of a call or probe
    pub fn report(&self, id: usize, outcome: CallOutcome) {
        let mut eps = self.endpoints.write().unwrap_or_else(PoisonError::into_inner);
        let Some(state) = eps.iter_mut().find(|s| s.endpoint.id == id) else {
            return;
        };

        match outcome {
            CallOutcome::Success { latency } => {
                let sample = latency.as_secs_f64() * 1000.0;
                let smoothed = match state.latency_ewma_ms {
                    Some(prev) => LATENCY_EWMA_ALPHA * sample + (1.0 - LATENCY_EWMA_ALPHA) * prev,
                    None => sample,
                };
                state.latency_ewma_ms = Some(smoothed);
                state.endpoint.latency = Some(Duration::from_secs_f64(smoothed / 1000.0));
                state.consecutive_failures = 0;

                if state.endpoint.health != EndpointHealth::Healthy {
                    info!(
                        endpoint = %state.endpoint.name,
                        from = %state.endpoint.health,
                        latency_ms = sample as u64,
                        "Endpoint marked HEALTHY"
                    );
                    state.endpoint.health = EndpointHealth::Healthy;
                }
            }
            CallOutcome::Failure => {
                state.consecutive_failures += 1;
                debug!(
                    endpoint = %state.endpoint.name,
                    failures = state.consecutive_failures,
                    "Endpoint call failed"
                );
                if state.consecutive_failures >= self.failure_threshold
                    && state.endpoint.health != EndpointHealth::Unhealthy
                {
                    warn!(
                        endpoint = %state.endpoint.name,
                        url = %state.endpoint.display_url(),
                        failures = state.consecutive_failures,
                        "Endpoint marked UNHEALTHY"
                    );
                    state.endpoint.health = EndpointHealth::Unhealthy;
                }
            }
            CallOutcome::Throttled => {
                debug!(endpoint = %state.endpoint.name, "Endpoint throttled request");
            }
        }
    }

    /// Current view of every endpoint, configuration order
    pub fn snapshot(&self) -> Vec<RpcEndpoint> {
        self.read(|eps| eps.iter().map(|s| s.endpoint.clone()).collect())
    }

    pub fn get(&self, id: usize) -> Option<RpcEndpoint> {
        self.read(|eps| {
            eps.iter()
                .find(|s| s.endpoint.id == id)
                .map(|s| s.endpoint.clone())
        })
    }

    pub fn healthy_count(&self) -> usize {
        self.read(|eps| {
            eps.iter()
                .filter(|s| s.endpoint.health == EndpointHealth::Healthy)
                .count()
        })
    }

    pub fn is_unhealthy(&self, id: usize) -> bool {
        self.get(id)
            .map_or(true, |e| e.health == EndpointHealth::Unhealthy)
    }

    fn read<T>(&self, f: impl FnOnce(&[EndpointState]) -> T) -> T {
        let eps = self.endpoints.read().unwrap_or_else(PoisonError::into_inner);
        f(&eps)
    }
}

fn rank(state: &EndpointState) -> u8 {
    match state.endpoint.health {
        EndpointHealth::Healthy => 0,
        EndpointHealth::Unknown => 1,
        EndpointHealth::Unhealthy => 2,
    }
}

fn latency_key(state: &EndpointState) -> f64 {
    state.latency_ewma_ms.unwrap_or(f64::INFINITY)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configs(names: &[&str]) -> Vec<EndpointConfig> {
        names
            .iter()
            .map(|n| EndpointConfig {
                name: n.to_string(),
                url: format!("https://{}.example.com", n),
                credential: None,
            })
            .collect()
    }

    fn ok(ms: u64) -> CallOutcome {
        CallOutcome::Success {
            latency: Duration::from_millis(ms),
        }
    }

    #[test]
    fn test_unknown_endpoints_selected_in_config_order() {
        let pool = EndpointPool::new(&configs(&["a", "b", "c"]), 3);
        assert_eq!(pool.select().unwrap().name, "a");
        assert_eq!(pool.select_excluding(&[0]).unwrap().name, "b");
    }

    #[test]
    fn test_prefers_lowest_latency_healthy() {
        let pool = EndpointPool::new(&configs(&["a", "b", "c"]), 3);
        pool.report(0, ok(300));
        pool.report(1, ok(50));
        pool.report(2, ok(120));
        assert_eq!(pool.select().unwrap().name, "b");
    }

    #[test]
    fn test_latency_tie_broken_by_config_order() {
        let pool = EndpointPool::new(&configs(&["a", "b"]), 3);
        pool.report(1, ok(80));
        pool.report(0, ok(80));
        assert_eq!(pool.select().unwrap().name, "a");
    }

    #[test]
    fn test_healthy_preferred_over_unknown() {
        let pool = EndpointPool::new(&configs(&["a", "b"]), 3);
        pool.report(1, ok(900));
        assert_eq!(pool.select().unwrap().name, "b");
    }

    #[test]
    fn test_failover_then_no_healthy_endpoint() {
        let pool = EndpointPool::new(&configs(&["a", "b"]), 2);

        // A unhealthy, B healthy
        pool.report(0, CallOutcome::Failure);
        pool.report(0, CallOutcome::Failure);
        pool.report(1, ok(40));
        assert_eq!(pool.select().unwrap().name, "b");

        // B fails enough times in a row
        pool.report(1, CallOutcome::Failure);
        assert_eq!(pool.select().unwrap().name, "b");
        pool.report(1, CallOutcome::Failure);

        assert!(matches!(pool.select(), Err(Error::NoHealthyEndpoint)));
        assert_eq!(pool.healthy_count(), 0);
    }

    #[test]
    fn test_success_resets_failure_count() {
        let pool = EndpointPool::new(&configs(&["a"]), 3);
        pool.report(0, CallOutcome::Failure);
        pool.report(0, CallOutcome::Failure);
        pool.report(0, ok(10));
        pool.report(0, CallOutcome::Failure);
        pool.report(0, CallOutcome::Failure);
        assert_eq!(pool.snapshot()[0].health, EndpointHealth::Healthy);
    }

    #[test]
    fn test_successful_probe_promotes_unhealthy() {
        let pool = EndpointPool::new(&configs(&["a"]), 1);
        pool.report(0, CallOutcome::Failure);
        assert!(pool.is_unhealthy(0));
        assert!(pool.select().is_err());

        pool.report(0, ok(25));
        assert_eq!(pool.select().unwrap().health, EndpointHealth::Healthy);
    }

    #[test]
    fn test_throttling_does_not_demote() {
        let pool = EndpointPool::new(&configs(&["a"]), 1);
        pool.report(0, CallOutcome::Throttled);
        pool.report(0, CallOutcome::Throttled);
        assert!(pool.select().is_ok());
    }

    #[test]
    fn test_request_url_with_credential() {
        let mut endpoint = EndpointPool::new(&configs(&["a"]), 1).select().unwrap();
        assert_eq!(endpoint.request_url(), "https://a.example.com");

        endpoint.credential = Some("k1".into());
        assert_eq!(endpoint.request_url(), "https://a.example.com?api-key=k1");

        endpoint.url = "https://a.example.com/?cluster=main".into();
        assert_eq!(
            endpoint.request_url(),
            "https://a.example.com/?cluster=main&api-key=k1"
        );
    }
}
