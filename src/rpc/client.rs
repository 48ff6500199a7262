//! Chain client
//!
//! Issues JSON-RPC 2.0 calls through the endpoint pool with a global
//! in-flight ceiling, per-call timeout, exponential backoff and N-way
//! failover.

use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use futures::future::join_all;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::endpoint::{CallOutcome, EndpointHealth, EndpointPool, RpcEndpoint};
use super::types::{
    lamports_to_sol, BalanceResult, RpcErrorObject, RpcRequest, SignatureInfo, TransactionDetail,
};
use super::Ledger;
use crate::config::RpcConfig;
use crate::error::{Error, Result};

/// Largest page `getSignaturesForAddress` accepts
const MAX_SIGNATURE_PAGE: usize = 1000;

/// JSON-RPC error codes meaning the node is behind or unhealthy
const NODE_LAGGING_CODES: [i64; 3] = [-32004, -32005, -32007];

/// JSON-RPC error codes meaning the caller is being throttled
const RATE_LIMIT_CODES: [i64; 2] = [429, -32429];

/// Result of probing a single endpoint
#[derive(Debug, Clone)]
pub struct ProbeReport {
    pub endpoint: RpcEndpoint,
    pub result: std::result::Result<Duration, String>,
}

/// Rate-limited, retrying JSON-RPC client
pub struct ChainClient {
    http: Client,
    pool: Arc<EndpointPool>,
    config: RpcConfig,
    in_flight: Arc<Semaphore>,
    next_id: AtomicU64,
}

impl ChainClient {
    /// Create a new chain client
    pub fn new(config: RpcConfig, pool: Arc<EndpointPool>) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            "Chain client initialized ({} endpoints, timeout {}ms, {} retries, {} in flight)",
            pool.len(),
            config.timeout_ms,
            config.max_retries,
            config.max_in_flight
        );

        Ok(Self {
            http,
            pool,
            in_flight: Arc::new(Semaphore::new(config.max_in_flight)),
            config,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn pool(&self) -> &Arc<EndpointPool> {
        &self.pool
    }

    /// Backoff schedule for one endpoint: base doubling, capped, with jitter
    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(self.config.retry_base_delay_ms))
            .with_multiplier(2.0)
            .with_randomization_factor(0.5)
            .with_max_interval(Duration::from_millis(self.config.retry_max_delay_ms))
            .with_max_elapsed_time(None)
            .build()
    }

    /// Call `method` and decode the result
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let raw = self.call_raw(method, params).await?;
        serde_json::from_value(raw)
            .map_err(|e| Error::MalformedResponse(format!("{}: {}", method, e)))
    }

    /// Call `method`, retrying transient failures and failing over between endpoints
    pub async fn call_raw(&self, method: &str, params: Value) -> Result<Value> {
        let mut tried: Vec<usize> = Vec::new();
        let mut last_error: Option<Error> = None;

        loop {
            let endpoint = match self.pool.select_excluding(&tried) {
                Ok(endpoint) => endpoint,
                Err(e) => return Err(last_error.unwrap_or(e)),
            };

            let mut backoff = self.backoff();
            let mut attempt: u32 = 0;

            loop {
                let permit = self
                    .in_flight
                    .acquire()
                    .await
                    .map_err(|_| Error::Cancelled)?;
                let started = Instant::now();
                let result = self.send_once(&endpoint, method, &params).await;
                let latency = started.elapsed();
                drop(permit);

                match result {
                    Ok(value) => {
                        self.pool.report(endpoint.id, CallOutcome::Success { latency });
                        return Ok(value);
                    }
                    Err(e) if e.is_retryable() => {
                        let outcome = if e.is_endpoint_fault() {
                            CallOutcome::Failure
                        } else {
                            CallOutcome::Throttled
                        };
                        self.pool.report(endpoint.id, outcome);
                        debug!(
                            endpoint = %endpoint.name,
                            method,
                            attempt,
                            error = %e,
                            "Retryable RPC error"
                        );
                        last_error = Some(e);

                        if attempt >= self.config.max_retries || self.pool.is_unhealthy(endpoint.id) {
                            break;
                        }
                        attempt += 1;

                        let delay = backoff
                            .next_backoff()
                            .unwrap_or(Duration::from_millis(self.config.retry_max_delay_ms));
                        tokio::time::sleep(delay).await;
                    }
                    Err(e) => {
                        debug!(endpoint = %endpoint.name, method, error = %e, "Permanent RPC error");
                        return Err(e);
                    }
                }
            }

            warn!(
                endpoint = %endpoint.name,
                method,
                "Retries exhausted on endpoint, failing over"
            );
            tried.push(endpoint.id);
        }
    }

    /// Single request against a single endpoint
    async fn send_once(&self, endpoint: &RpcEndpoint, method: &str, params: &Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest::new(id, method, params.clone());

        let response = self
            .http
            .post(endpoint.request_url())
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::RateLimited(format!("HTTP 429 from {}", endpoint.name)));
        }
        if status.is_server_error() {
            return Err(Error::Unreachable(format!("HTTP {} from {}", status, endpoint.name)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::RpcRejected {
                code: status.as_u16() as i64,
                message: body,
            });
        }

        let body: Value = response.json().await.map_err(|e| {
            if e.is_timeout() {
                Error::RpcTimeout(self.config.timeout_ms)
            } else {
                Error::MalformedResponse(format!("{}: invalid JSON body: {}", method, e))
            }
        })?;

        parse_envelope(method, body)
    }

    fn transport_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::RpcTimeout(self.config.timeout_ms)
        } else {
            Error::Unreachable(e.to_string())
        }
    }

    /// Probe one endpoint with `getHealth`, no retries, and report the outcome
    pub async fn probe(&self, endpoint: &RpcEndpoint) -> ProbeReport {
        let started = Instant::now();
        let result = match self.send_once(endpoint, "getHealth", &json!([])).await {
            Ok(Value::String(s)) if s == "ok" => Ok(started.elapsed()),
            Ok(other) => Err(format!("unexpected health response: {}", other)),
            Err(e) => Err(e.to_string()),
        };

        match &result {
            Ok(latency) => self.pool.report(endpoint.id, CallOutcome::Success { latency: *latency }),
            Err(reason) => {
                debug!(endpoint = %endpoint.name, reason = %reason, "Health probe failed");
                self.pool.report(endpoint.id, CallOutcome::Failure);
            }
        }

        ProbeReport {
            endpoint: self.pool.get(endpoint.id).unwrap_or_else(|| endpoint.clone()),
            result,
        }
    }

    /// Probe every endpoint concurrently
    pub async fn probe_all(&self) -> Vec<ProbeReport> {
        let endpoints = self.pool.snapshot();
        join_all(endpoints.iter().map(|e| self.probe(e))).await
    }
}

/// Split a JSON-RPC response body into result or typed error
fn parse_envelope(method: &str, body: Value) -> Result<Value> {
    if let Some(error) = body.get("error").filter(|e| !e.is_null()) {
        let error: RpcErrorObject = serde_json::from_value(error.clone())
            .map_err(|e| Error::MalformedResponse(format!("{}: bad error object: {}", method, e)))?;
        return Err(classify_rpc_error(error));
    }

    match body.get("result") {
        Some(result) => Ok(result.clone()),
        None => Err(Error::MalformedResponse(format!("{}: response has no result", method))),
    }
}

fn classify_rpc_error(error: RpcErrorObject) -> Error {
    if RATE_LIMIT_CODES.contains(&error.code) {
        Error::RateLimited(error.message)
    } else if NODE_LAGGING_CODES.contains(&error.code) {
        Error::Unreachable(format!("node error {}: {}", error.code, error.message))
    } else {
        Error::RpcRejected {
            code: error.code,
            message: error.message,
        }
    }
}

#[async_trait]
impl Ledger for ChainClient {
    async fn probe_endpoints(&self) -> usize {
        let reports = self.probe_all().await;
        for report in &reports {
            match &report.result {
                Ok(latency) => info!(
                    endpoint = %report.endpoint.name,
                    url = %report.endpoint.display_url(),
                    latency_ms = latency.as_millis() as u64,
                    "Endpoint reachable"
                ),
                Err(reason) => warn!(
                    endpoint = %report.endpoint.name,
                    url = %report.endpoint.display_url(),
                    reason = %reason,
                    "Endpoint unreachable"
                ),
            }
        }
        reports.iter().filter(|r| r.result.is_ok()).count()
    }

    async fn revive_endpoints(&self) -> usize {
        let unhealthy: Vec<RpcEndpoint> = self
            .pool
            .snapshot()
            .into_iter()
            .filter(|e| e.health == EndpointHealth::Unhealthy)
            .collect();
        if unhealthy.is_empty() {
            return 0;
        }

        let reports = join_all(unhealthy.iter().map(|e| self.probe(e))).await;
        let revived = reports.iter().filter(|r| r.result.is_ok()).count();
        if revived > 0 {
            info!("Revived {} of {} unhealthy endpoints", revived, unhealthy.len());
        }
        revived
    }

    async fn get_balance(&self, address: &str) -> Result<f64> {
        let result: BalanceResult = self.call("getBalance", json!([address])).await?;
        Ok(lamports_to_sol(result.value))
    }

    async fn get_transaction_signatures(
        &self,
        address: &str,
        limit: usize,
    ) -> Result<Vec<SignatureInfo>> {
        let limit = limit.clamp(1, MAX_SIGNATURE_PAGE);
        self.call("getSignaturesForAddress", json!([address, { "limit": limit }]))
            .await
    }

    async fn get_transaction_detail(&self, signature: &str) -> Result<Option<TransactionDetail>> {
        self.call(
            "getTransaction",
            json!([signature, { "encoding": "json", "maxSupportedTransactionVersion": 0 }]),
        )
        .await
    }
}
