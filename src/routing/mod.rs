//! Read/write connection routing.
//!
//! # Data Flow
//! ```text
//! caller declares AccessIntent
//!     → Write: writer if healthy, else NoWriterAvailable
//!     → Read:  healthy readers → ReaderSelector (balancer.rs)
//!              no healthy reader → writer (degraded, fallback flag set)
//!              nothing healthy → NoEndpointAvailable
//!     → EndpointGuard held for the duration of one operation
//! ```
//!
//! `route` never blocks: it reads atomic health flags, bumps the rotation
//! cursor and the chosen endpoint's counters. The pool itself is swapped
//! wholesale through `ArcSwap` on reconfiguration.

pub mod balancer;

use crate::config::{Config, ConfigError, SelectionPolicy};
use crate::core::connection::ConnectionPool;
use crate::core::{
    AccessIntent, Endpoint, EndpointGuard, EndpointPool, EndpointRole, HealthStatus,
};
use crate::error::{RouterError, RouterResult};
use arc_swap::ArcSwap;
use balancer::{selector_for, ReaderSelector};
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Why an endpoint was passed over during a routing call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Marked unhealthy by the health monitor
    Unhealthy,
    /// Not yet confirmed by a successful probe
    Unknown,
}

impl From<HealthStatus> for SkipReason {
    fn from(status: HealthStatus) -> Self {
        match status {
            HealthStatus::Unknown => SkipReason::Unknown,
            _ => SkipReason::Unhealthy,
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Unhealthy => write!(f, "unhealthy"),
            SkipReason::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEndpoint {
    pub id: String,
    pub reason: SkipReason,
}

/// Outcome of one routing call.
///
/// Holds the chosen endpoint for one database operation; dropping the
/// decision (or calling `release`) ends the hold.
#[derive(Debug)]
pub struct RoutingDecision {
    endpoint: EndpointGuard,
    pub intent: AccessIntent,
    /// Set when a read was served by the writer because no reader was healthy
    pub fallback: bool,
    pub skipped: Vec<SkippedEndpoint>,
    pub operation_id: Option<String>,
}

impl RoutingDecision {
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn endpoint_id(&self) -> &str {
        &self.endpoint.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.endpoint.addr
    }

    /// Release the endpoint hold
    pub fn release(self) {}
}

/// Router-wide counters
#[derive(Debug, Default)]
pub struct RoutingStats {
    reads: AtomicU64,
    writes: AtomicU64,
    fallbacks: AtomicU64,
    failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoutingStatsSnapshot {
    pub reads: u64,
    pub writes: u64,
    pub fallbacks: u64,
    pub failures: u64,
}

impl RoutingStats {
    pub fn snapshot(&self) -> RoutingStatsSnapshot {
        RoutingStatsSnapshot {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of one endpoint
#[derive(Debug, Clone)]
pub struct EndpointSnapshot {
    pub id: String,
    pub addr: SocketAddr,
    pub role: EndpointRole,
    pub status: HealthStatus,
    pub in_flight: usize,
    pub selections: u64,
    pub consecutive_failures: u32,
    pub last_checked: Option<SystemTime>,
}

/// Selects the endpoint for each database operation
#[derive(Debug)]
pub struct Router {
    pool: ArcSwap<EndpointPool>,
    selector: ArcSwap<Box<dyn ReaderSelector>>,
    tick: AtomicU64,
    stats: RoutingStats,
}

impl Router {
    pub fn new(pool: EndpointPool, policy: SelectionPolicy) -> Self {
        Self::with_selector(pool, selector_for(policy))
    }

    pub fn with_selector(pool: EndpointPool, selector: Box<dyn ReaderSelector>) -> Self {
        Self {
            pool: ArcSwap::from_pointee(pool),
            selector: ArcSwap::from_pointee(selector),
            tick: AtomicU64::new(0),
            stats: RoutingStats::default(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let pool = EndpointPool::from_config(&config.endpoints)?;
        Ok(Self::new(pool, config.routing.policy))
    }

    /// Current endpoint pool
    pub fn pool(&self) -> Arc<EndpointPool> {
        self.pool.load_full()
    }

    pub fn policy(&self) -> SelectionPolicy {
        self.selector.load().policy()
    }

    /// Switch reader selection to `policy`, keeping the current selector if it already applies
    pub fn set_policy(&self, policy: SelectionPolicy) {
        if self.policy() == policy {
            return;
        }
        info!(
            target: "dbroute::routing",
            from = ?self.policy(),
            to = ?policy,
            "Reader selection policy changed"
        );
        self.selector.store(Arc::new(selector_for(policy)));
    }

    pub fn stats(&self) -> RoutingStatsSnapshot {
        self.stats.snapshot()
    }

    /// Replace the endpoint pool. Operations already holding an endpoint of the
    /// old pool keep it until they release.
    pub fn reconfigure(&self, pool: EndpointPool) {
        info!(
            target: "dbroute::routing",
            writer = %pool.writer().id,
            readers = pool.readers().len(),
            "Endpoint pool replaced"
        );
        self.pool.store(Arc::new(pool));
    }

    /// Select the endpoint for one operation
    pub fn route(
        &self,
        intent: AccessIntent,
        operation_id: Option<&str>,
    ) -> RouterResult<RoutingDecision> {
        let pool = self.pool.load();
        let result = match intent {
            AccessIntent::Write => self.route_write(&pool, operation_id),
            AccessIntent::Read => self.route_read(&pool, operation_id),
        };

        if result.is_err() {
            self.stats.failures.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    fn route_write(
        &self,
        pool: &EndpointPool,
        operation_id: Option<&str>,
    ) -> RouterResult<RoutingDecision> {
        let writer = pool.writer();
        if !writer.is_healthy() {
            warn!(
                target: "dbroute::routing",
                intent = "write",
                writer = %writer.id,
                status = %writer.status(),
                operation_id = operation_id.unwrap_or("-"),
                "Write rejected: writer not healthy"
            );
            return Err(RouterError::no_writer(&writer.id));
        }

        self.stats.writes.fetch_add(1, Ordering::Relaxed);
        Ok(self.decide(writer, AccessIntent::Write, false, Vec::new(), operation_id))
    }

    fn route_read(
        &self,
        pool: &EndpointPool,
        operation_id: Option<&str>,
    ) -> RouterResult<RoutingDecision> {
        let mut skipped = Vec::new();
        let mut candidates = Vec::with_capacity(pool.readers().len());

        for reader in pool.readers() {
            let status = reader.status();
            if status.is_healthy() {
                candidates.push(reader);
            } else {
                skipped.push(SkippedEndpoint {
                    id: reader.id.clone(),
                    reason: status.into(),
                });
            }
        }

        let selector = self.selector.load();
        if let Some(chosen) = selector.select(&candidates).and_then(|i| candidates.get(i)) {
            self.stats.reads.fetch_add(1, Ordering::Relaxed);
            return Ok(self.decide(chosen, AccessIntent::Read, false, skipped, operation_id));
        }

        let writer = pool.writer();
        if writer.is_healthy() {
            self.stats.reads.fetch_add(1, Ordering::Relaxed);
            self.stats.fallbacks.fetch_add(1, Ordering::Relaxed);
            warn!(
                target: "dbroute::routing",
                intent = "read",
                endpoint = %writer.id,
                fallback = true,
                skipped = skipped.len(),
                operation_id = operation_id.unwrap_or("-"),
                "No healthy reader, routing read to writer"
            );
            return Ok(self.decide(writer, AccessIntent::Read, true, skipped, operation_id));
        }

        warn!(
            target: "dbroute::routing",
            intent = "read",
            readers = pool.readers().len(),
            operation_id = operation_id.unwrap_or("-"),
            "No healthy endpoint for read"
        );
        Err(RouterError::no_endpoint(AccessIntent::Read.to_string()))
    }

    fn decide(
        &self,
        endpoint: &Arc<Endpoint>,
        intent: AccessIntent,
        fallback: bool,
        skipped: Vec<SkippedEndpoint>,
        operation_id: Option<&str>,
    ) -> RoutingDecision {
        let tick = self.tick.fetch_add(1, Ordering::Relaxed) + 1;
        endpoint.mark_selected(tick);
        let guard = endpoint.acquire();

        debug!(
            target: "dbroute::routing",
            intent = %intent,
            endpoint = %endpoint.id,
            fallback,
            in_flight = guard.in_flight(),
            operation_id = operation_id.unwrap_or("-"),
            "Routed operation"
        );

        RoutingDecision {
            endpoint: guard,
            intent,
            fallback,
            skipped,
            operation_id: operation_id.map(str::to_string),
        }
    }

    /// Route, then acquire a connection from `connections` for the chosen endpoint.
    /// The endpoint hold is released if acquisition fails.
    pub async fn acquire_connection<P: ConnectionPool>(
        &self,
        connections: &P,
        intent: AccessIntent,
        operation_id: Option<&str>,
    ) -> RouterResult<RoutedConnection<P::Connection>> {
        let decision = self.route(intent, operation_id)?;
        let connection = connections.acquire(decision.endpoint()).await?;
        Ok(RoutedConnection {
            connection,
            decision,
        })
    }

    /// Per-endpoint view of the current pool, writer first
    pub fn snapshot(&self) -> Vec<EndpointSnapshot> {
        self.pool
            .load()
            .all()
            .map(|e| EndpointSnapshot {
                id: e.id.clone(),
                addr: e.addr,
                role: e.role,
                status: e.status(),
                in_flight: e.in_flight(),
                selections: e.selections(),
                consecutive_failures: e.consecutive_failures(),
                last_checked: e.last_checked(),
            })
            .collect()
    }
}

/// A connection paired with the routing decision that produced it
#[derive(Debug)]
pub struct RoutedConnection<C> {
    pub connection: C,
    pub decision: RoutingDecision,
}

impl<C> RoutedConnection<C> {
    /// Hand the connection back to its pool and release the endpoint
    pub fn release<P: ConnectionPool<Connection = C>>(self, connections: &P) {
        connections.release(self.connection);
        self.decision.release();
    }
}
