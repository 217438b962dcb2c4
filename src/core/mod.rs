/// Core routing abstractions: endpoints, intents and health state
pub mod connection;
pub mod pool;

pub use pool::EndpointPool;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;

/// Role of an endpoint in the primary/replica topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointRole {
    Writer,
    Reader,
}

impl fmt::Display for EndpointRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointRole::Writer => write!(f, "writer"),
            EndpointRole::Reader => write!(f, "reader"),
        }
    }
}

/// Access intent declared by the caller for a single database operation.
///
/// Never inferred from the statement being executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessIntent {
    Read,
    Write,
}

impl fmt::Display for AccessIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessIntent::Read => write!(f, "read"),
            AccessIntent::Write => write!(f, "write"),
        }
    }
}

/// Health state of an endpoint
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Unknown = 0,
    Healthy = 1,
    Unhealthy = 2,
}

impl From<u8> for HealthStatus {
    fn from(val: u8) -> Self {
        match val {
            1 => HealthStatus::Healthy,
            2 => HealthStatus::Unhealthy,
            _ => HealthStatus::Unknown,
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
            HealthStatus::Unknown => write!(f, "unknown"),
        }
    }
}

impl HealthStatus {
    /// Only `Healthy` endpoints receive traffic; `Unknown` counts as unhealthy.
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

/// A change of health status observed on one endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthTransition {
    pub from: HealthStatus,
    pub to: HealthStatus,
}

#[derive(Debug)]
struct HealthRecord {
    status: HealthStatus,
    consecutive_failures: u32,
    last_checked: Option<SystemTime>,
}

/// One database endpoint (writer or reader).
///
/// Routing reads `status` without locking. Probe results are applied under the
/// endpoint's own `health` mutex, so transitions are serialized per endpoint and
/// published to `status` before the lock is released.
#[derive(Debug)]
pub struct Endpoint {
    pub id: String,
    pub addr: SocketAddr,
    pub role: EndpointRole,
    /// Maximum connections for this endpoint's connection pool
    pub pool_size: usize,
    status: AtomicU8,
    health: Mutex<HealthRecord>,
    in_flight: AtomicUsize,
    selections: AtomicU64,
    last_selected: AtomicU64,
}

impl Endpoint {
    pub fn new(id: impl Into<String>, addr: SocketAddr, role: EndpointRole, pool_size: usize) -> Self {
        Self {
            id: id.into(),
            addr,
            role,
            pool_size,
            status: AtomicU8::new(HealthStatus::Unknown as u8),
            health: Mutex::new(HealthRecord {
                status: HealthStatus::Unknown,
                consecutive_failures: 0,
                last_checked: None,
            }),
            in_flight: AtomicUsize::new(0),
            selections: AtomicU64::new(0),
            last_selected: AtomicU64::new(0),
        }
    }

    pub fn new_writer(id: impl Into<String>, addr: SocketAddr) -> Self {
        Self::new(id, addr, EndpointRole::Writer, 10)
    }

    pub fn new_reader(id: impl Into<String>, addr: SocketAddr) -> Self {
        Self::new(id, addr, EndpointRole::Reader, 10)
    }

    fn lock_health(&self) -> MutexGuard<'_, HealthRecord> {
        // A poisoned record is still consistent: every write completes before unlock.
        self.health.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current health status
    pub fn status(&self) -> HealthStatus {
        HealthStatus::from(self.status.load(Ordering::Acquire))
    }

    pub fn is_healthy(&self) -> bool {
        self.status().is_healthy()
    }

    /// Number of consecutive failed probes since the last success
    pub fn consecutive_failures(&self) -> u32 {
        self.lock_health().consecutive_failures
    }

    /// Wall-clock time of the last applied probe result
    pub fn last_checked(&self) -> Option<SystemTime> {
        self.lock_health().last_checked
    }

    /// Apply a successful probe. A single success restores a non-healthy endpoint.
    pub fn record_probe_success(&self) -> Option<HealthTransition> {
        let mut record = self.lock_health();
        record.last_checked = Some(SystemTime::now());
        record.consecutive_failures = 0;

        if record.status == HealthStatus::Healthy {
            return None;
        }
        Some(self.transition(&mut record, HealthStatus::Healthy))
    }

    /// Apply a failed probe. The endpoint becomes unhealthy once `threshold`
    /// consecutive failures have been recorded.
    pub fn record_probe_failure(&self, threshold: u32) -> Option<HealthTransition> {
        let mut record = self.lock_health();
        record.last_checked = Some(SystemTime::now());
        record.consecutive_failures = record.consecutive_failures.saturating_add(1);

        if record.status == HealthStatus::Unhealthy
            || record.consecutive_failures < threshold.max(1)
        {
            return None;
        }
        Some(self.transition(&mut record, HealthStatus::Unhealthy))
    }

    fn transition(&self, record: &mut HealthRecord, to: HealthStatus) -> HealthTransition {
        let from = record.status;
        record.status = to;
        self.status.store(to as u8, Ordering::Release);
        HealthTransition { from, to }
    }

    /// Operations currently holding this endpoint
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Total number of times this endpoint was selected
    pub fn selections(&self) -> u64 {
        self.selections.load(Ordering::Relaxed)
    }

    /// Router tick of the most recent selection (0 if never selected)
    pub fn last_selected(&self) -> u64 {
        self.last_selected.load(Ordering::Relaxed)
    }

    pub(crate) fn mark_selected(&self, tick: u64) {
        self.selections.fetch_add(1, Ordering::Relaxed);
        self.last_selected.fetch_max(tick, Ordering::Relaxed);
    }

    /// Acquire the endpoint for one operation; the returned guard releases it on drop.
    pub fn acquire(self: &Arc<Self>) -> EndpointGuard {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        EndpointGuard {
            endpoint: Arc::clone(self),
        }
    }
}

/// Scoped hold on an endpoint; decrements the in-flight counter exactly once.
#[derive(Debug)]
pub struct EndpointGuard {
    endpoint: Arc<Endpoint>,
}

impl EndpointGuard {
    /// Release the endpoint explicitly. Equivalent to dropping the guard.
    pub fn release(self) {}
}

impl Deref for EndpointGuard {
    type Target = Endpoint;
    fn deref(&self) -> &Self::Target {
        &self.endpoint
    }
}

impl Drop for EndpointGuard {
    fn drop(&mut self) {
        self.endpoint.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader() -> Arc<Endpoint> {
        Arc::new(Endpoint::new_reader(
            "reader-1",
            "127.0.0.1:5433".parse().unwrap(),
        ))
    }

    #[test]
    fn test_new_endpoint_is_unknown_and_not_routable() {
        let endpoint = reader();
        assert_eq!(endpoint.status(), HealthStatus::Unknown);
        assert!(!endpoint.is_healthy());
        assert!(endpoint.last_checked().is_none());
    }

    #[test]
    fn test_unhealthy_after_exactly_k_failures() {
        let endpoint = reader();
        endpoint.record_probe_success();
        assert!(endpoint.is_healthy());

        assert_eq!(endpoint.record_probe_failure(3), None);
        assert_eq!(endpoint.record_probe_failure(3), None);
        assert!(endpoint.is_healthy());

        let transition = endpoint.record_probe_failure(3);
        assert_eq!(
            transition,
            Some(HealthTransition {
                from: HealthStatus::Healthy,
                to: HealthStatus::Unhealthy,
            })
        );
        assert_eq!(endpoint.status(), HealthStatus::Unhealthy);

        // Further failures do not re-transition
        assert_eq!(endpoint.record_probe_failure(3), None);
        assert_eq!(endpoint.consecutive_failures(), 4);
    }

    #[test]
    fn test_single_success_recovers() {
        let endpoint = reader();
        for _ in 0..3 {
            endpoint.record_probe_failure(3);
        }
        assert_eq!(endpoint.status(), HealthStatus::Unhealthy);

        let transition = endpoint.record_probe_success();
        assert_eq!(
            transition,
            Some(HealthTransition {
                from: HealthStatus::Unhealthy,
                to: HealthStatus::Healthy,
            })
        );
        assert!(endpoint.is_healthy());
        assert_eq!(endpoint.consecutive_failures(), 0);
        assert!(endpoint.last_checked().is_some());
    }

    #[test]
    fn test_success_resets_failure_streak() {
        let endpoint = reader();
        endpoint.record_probe_success();
        endpoint.record_probe_failure(3);
        endpoint.record_probe_failure(3);
        endpoint.record_probe_success();
        endpoint.record_probe_failure(3);
        endpoint.record_probe_failure(3);
        assert!(endpoint.is_healthy());
    }

    #[test]
    fn test_concurrent_failures_transition_once() {
        let endpoint = reader();
        let endpoint: &Endpoint = &endpoint;
        for _ in 0..20 {
            endpoint.record_probe_success();
            assert!(endpoint.is_healthy());

            let transitions: Vec<HealthTransition> = std::thread::scope(|scope| {
                let workers: Vec<_> = (0..8)
                    .map(|_| {
                        scope.spawn(move || {
                            let mut seen = Vec::new();
                            for _ in 0..50 {
                                if let Some(t) = endpoint.record_probe_failure(3) {
                                    // Published before the transition is handed back
                                    assert_eq!(endpoint.status(), HealthStatus::Unhealthy);
                                    seen.push(t);
                                }
                            }
                            seen
                        })
                    })
                    .collect();
                workers
                    .into_iter()
                    .flat_map(|w| w.join().unwrap())
                    .collect()
            });

            assert_eq!(
                transitions,
                vec![HealthTransition {
                    from: HealthStatus::Healthy,
                    to: HealthStatus::Unhealthy,
                }]
            );
            assert_eq!(endpoint.status(), HealthStatus::Unhealthy);
            assert_eq!(endpoint.consecutive_failures(), 400);
        }
    }

    #[test]
    fn test_concurrent_mixed_results_stay_consistent() {
        let endpoint = reader();
        let endpoint: &Endpoint = &endpoint;
        endpoint.record_probe_success();
        let done = std::sync::atomic::AtomicBool::new(false);
        let done = &done;

        let transitions: Vec<HealthTransition> = std::thread::scope(|scope| {
            // Readers never observe the endpoint falling back to unknown
            scope.spawn(move || {
                while !done.load(Ordering::Acquire) {
                    assert_ne!(endpoint.status(), HealthStatus::Unknown);
                }
            });

            let workers: Vec<_> = (0..8)
                .map(|i| {
                    scope.spawn(move || {
                        let mut seen = Vec::new();
                        for _ in 0..200 {
                            let t = if i % 2 == 0 {
                                endpoint.record_probe_failure(2)
                            } else {
                                endpoint.record_probe_success()
                            };
                            seen.extend(t);
                        }
                        seen
                    })
                })
                .collect();
            let all = workers
                .into_iter()
                .flat_map(|w| w.join().unwrap())
                .collect();
            done.store(true, Ordering::Release);
            all
        });

        let downs = transitions
            .iter()
            .filter(|t| t.to == HealthStatus::Unhealthy)
            .count();
        let ups = transitions.len() - downs;
        let balance = downs as i64 - ups as i64;
        assert!(transitions.iter().all(|t| t.from != t.to));

        // Transitions alternate, so the final state is decided by the difference
        match balance {
            0 => assert_eq!(endpoint.status(), HealthStatus::Healthy),
            1 => assert_eq!(endpoint.status(), HealthStatus::Unhealthy),
            other => panic!("unbalanced transitions: {}", other),
        }
    }

    #[test]
    fn test_guard_tracks_in_flight() {
        let endpoint = reader();
        let first = endpoint.acquire();
        let second = endpoint.acquire();
        assert_eq!(endpoint.in_flight(), 2);

        first.release();
        assert_eq!(endpoint.in_flight(), 1);

        drop(second);
        assert_eq!(endpoint.in_flight(), 0);
    }

    #[test]
    fn test_status_from_u8() {
        assert_eq!(HealthStatus::from(1), HealthStatus::Healthy);
        assert_eq!(HealthStatus::from(2), HealthStatus::Unhealthy);
        assert_eq!(HealthStatus::from(9), HealthStatus::Unknown);
        assert_eq!(AccessIntent::Read.to_string(), "read");
        assert_eq!(EndpointRole::Writer.to_string(), "writer");
    }
}
