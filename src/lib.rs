pub mod config;
pub mod error;
/// dbroute - health-aware read/write connection router for primary/replica databases
///
/// Every data-access call site declares an `AccessIntent`; the router answers
/// with one endpoint:
/// 1. Writes always go to the single writer, or fail fast when it is unhealthy
/// 2. Reads are spread across healthy readers and degrade to the writer when none is left
///
/// A background health monitor probes every endpoint and drives the health state
/// that routing decisions read.
pub mod core;
pub mod health;
pub mod routing;
pub mod utils;

pub use crate::config::{Config, SelectionPolicy};
pub use crate::core::{AccessIntent, Endpoint, EndpointPool, EndpointRole, HealthStatus};
pub use crate::error::{RouterError, RouterResult};
pub use crate::routing::{Router, RoutingDecision};

use crate::core::connection::{PooledConnection, TcpConnectionPool};
use crate::health::tcp::TcpProber;
use crate::health::{HealthMonitor, ProbeReport, Prober};
use crate::routing::RoutedConnection;
use crate::utils::generate_id;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Router plus its health monitor and connection pools, assembled from configuration
pub struct RouterService {
    config: Config,
    router: Arc<Router>,
    connections: Arc<TcpConnectionPool>,
    prober: Arc<dyn Prober>,
    shutdown: broadcast::Sender<()>,
    monitor: Option<JoinHandle<()>>,
}

impl RouterService {
    /// Create a service probing endpoints over TCP
    pub fn new(config: Config) -> RouterResult<Self> {
        Self::with_prober(config, Arc::new(TcpProber::new()))
    }

    /// Create a service with a custom liveness probe
    pub fn with_prober(config: Config, prober: Arc<dyn Prober>) -> RouterResult<Self> {
        config.validate()?;

        let router = Arc::new(Router::from_config(&config)?);
        let connections = Arc::new(TcpConnectionPool::new(config.connections.connect_timeout()));
        let (shutdown, _) = broadcast::channel(1);

        Ok(Self {
            config,
            router,
            connections,
            prober,
            shutdown,
            monitor: None,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn router(&self) -> Arc<Router> {
        Arc::clone(&self.router)
    }

    pub fn connections(&self) -> Arc<TcpConnectionPool> {
        Arc::clone(&self.connections)
    }

    fn health_monitor(&self) -> HealthMonitor {
        HealthMonitor::new(
            Arc::clone(&self.router),
            Arc::clone(&self.prober),
            &self.config.health,
        )
    }

    fn spawn_monitor(&mut self) {
        let monitor = self.health_monitor();
        self.monitor = Some(tokio::spawn(monitor.run(self.shutdown.subscribe())));
    }

    /// Signal the monitor task and wait for it. Returns false if none was running.
    async fn stop_monitor(&mut self) -> bool {
        let Some(handle) = self.monitor.take() else {
            return false;
        };
        let _ = self.shutdown.send(());
        if let Err(e) = handle.await {
            tracing::error!("Health monitor task failed: {}", e);
        }
        true
    }

    /// Spawn the background health monitor
    pub fn start(&mut self) -> RouterResult<()> {
        if self.monitor.is_some() {
            return Err(RouterError::internal("health monitor already running"));
        }

        self.spawn_monitor();

        tracing::info!(
            endpoints = self.config.endpoints.len(),
            policy = ?self.router.policy(),
            "Router service started"
        );
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.monitor.is_some()
    }

    /// Run one probe round immediately, independent of the background interval
    pub async fn probe_once(&self) -> Vec<ProbeReport> {
        self.health_monitor().check_all().await
    }

    /// Route one operation. Without a caller-supplied id, one is generated so
    /// every decision can be traced.
    pub fn route(
        &self,
        intent: AccessIntent,
        operation_id: Option<&str>,
    ) -> RouterResult<RoutingDecision> {
        let operation_id = operation_id_or_new(operation_id);
        self.router.route(intent, Some(&operation_id))
    }

    /// Route and open a pooled connection to the chosen endpoint
    pub async fn acquire(
        &self,
        intent: AccessIntent,
        operation_id: Option<&str>,
    ) -> RouterResult<RoutedConnection<PooledConnection>> {
        let operation_id = operation_id_or_new(operation_id);
        self.router
            .acquire_connection(self.connections.as_ref(), intent, Some(&operation_id))
            .await
    }

    /// Apply a new configuration
    ///
    /// The endpoint set is replaced (new endpoints start unknown until probed),
    /// connection pool limits and the connect timeout follow the new values,
    /// the reader selection policy is switched, and a running health monitor is
    /// restarted when its settings changed.
    pub async fn reconfigure(&mut self, config: Config) -> RouterResult<()> {
        config.validate()?;
        let pool = EndpointPool::from_config(&config.endpoints)?;

        self.connections.reconfigure(&pool);
        self.connections
            .set_connect_timeout(config.connections.connect_timeout());
        self.router.reconfigure(pool);
        self.router.set_policy(config.routing.policy);

        let health_changed = config.health != self.config.health;
        self.config = config;

        if health_changed && self.stop_monitor().await {
            self.spawn_monitor();
            tracing::info!(
                interval_sec = self.config.health.interval_sec,
                timeout_sec = self.config.health.timeout_sec,
                failure_threshold = self.config.health.failure_threshold,
                "Health monitor restarted with new settings"
            );
        }
        Ok(())
    }

    /// Stop the health monitor and wait for it to exit
    pub async fn shutdown(&mut self) {
        if self.stop_monitor().await {
            tracing::info!("Router service stopped");
        }
    }
}

fn operation_id_or_new(operation_id: Option<&str>) -> String {
    operation_id.map_or_else(|| generate_id("op"), str::to_string)
}
