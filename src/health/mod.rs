/// Health checking for database endpoints
pub mod tcp;

use crate::config::HealthConfig;
use crate::core::{Endpoint, HealthStatus, HealthTransition};
use crate::error::ProbeFailure;
use crate::routing::Router;
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{timeout, MissedTickBehavior};

/// Liveness probe against a single endpoint
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, endpoint: &Endpoint) -> Result<(), ProbeFailure>;
}

/// Outcome of probing one endpoint in a round
#[derive(Debug, Clone)]
pub struct ProbeReport {
    pub endpoint_id: String,
    pub result: Result<(), ProbeFailure>,
    pub status: HealthStatus,
    pub transition: Option<HealthTransition>,
}

/// Periodically probes every endpoint in the router's current pool
pub struct HealthMonitor {
    router: Arc<Router>,
    prober: Arc<dyn Prober>,
    interval: Duration,
    probe_timeout: Duration,
    failure_threshold: u32,
}

impl HealthMonitor {
    pub fn new(router: Arc<Router>, prober: Arc<dyn Prober>, config: &HealthConfig) -> Self {
        Self {
            router,
            prober,
            interval: config.interval(),
            probe_timeout: config.timeout(),
            failure_threshold: config.failure_threshold,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Probe all endpoints concurrently and apply the results
    pub async fn check_all(&self) -> Vec<ProbeReport> {
        let pool = self.router.pool();
        join_all(pool.all().map(|endpoint| self.check_endpoint(endpoint))).await
    }

    async fn check_endpoint(&self, endpoint: &Endpoint) -> ProbeReport {
        let result = match timeout(self.probe_timeout, self.prober.probe(endpoint)).await {
            Ok(result) => result,
            Err(_) => Err(ProbeFailure::Timeout {
                millis: self.probe_timeout.as_millis() as u64,
            }),
        };

        let transition = match &result {
            Ok(()) => endpoint.record_probe_success(),
            Err(failure) => {
                tracing::debug!(
                    endpoint = %endpoint.id,
                    failures = endpoint.consecutive_failures() + 1,
                    "Probe failed: {}", failure
                );
                endpoint.record_probe_failure(self.failure_threshold)
            }
        };

        if let Some(transition) = transition {
            log_transition(endpoint, transition, result.as_ref().err());
        }

        ProbeReport {
            endpoint_id: endpoint.id.clone(),
            result,
            status: endpoint.status(),
            transition,
        }
    }

    /// Run probe rounds on a fixed interval until shutdown is signalled
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval_ms = self.interval.as_millis() as u64,
            timeout_ms = self.probe_timeout.as_millis() as u64,
            failure_threshold = self.failure_threshold,
            "Health monitor starting"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_all().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

fn log_transition(endpoint: &Endpoint, transition: HealthTransition, cause: Option<&ProbeFailure>) {
    match transition.to {
        HealthStatus::Healthy => tracing::info!(
            endpoint = %endpoint.id,
            role = %endpoint.role,
            from = %transition.from,
            to = %transition.to,
            "Endpoint is healthy"
        ),
        _ => tracing::warn!(
            endpoint = %endpoint.id,
            role = %endpoint.role,
            from = %transition.from,
            to = %transition.to,
            cause = %cause.map(|c| c.to_string()).unwrap_or_default(),
            "Endpoint marked unhealthy"
        ),
    }
}
