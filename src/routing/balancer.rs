/// Reader selection policies
use crate::config::SelectionPolicy;
use crate::core::Endpoint;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Picks one reader among the currently healthy candidates
pub trait ReaderSelector: Send + Sync + fmt::Debug {
    /// Select an index into `candidates`; `None` only when `candidates` is empty
    fn select(&self, candidates: &[&Arc<Endpoint>]) -> Option<usize>;

    fn policy(&self) -> SelectionPolicy;
}

/// Build the selector for a configured policy
pub fn selector_for(policy: SelectionPolicy) -> Box<dyn ReaderSelector> {
    match policy {
        SelectionPolicy::RoundRobin => Box::new(RoundRobin::new()),
        SelectionPolicy::LeastRecentlyUsed => Box::new(LeastRecentlyUsed::new()),
        SelectionPolicy::LeastInFlight => Box::new(LeastInFlight::new()),
    }
}

/// Round-robin over healthy readers using a shared rotation cursor
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReaderSelector for RoundRobin {
    fn select(&self, candidates: &[&Arc<Endpoint>]) -> Option<usize> {
        if candidates.is_empty() {
            return None;
        }

        let index = self.counter.fetch_add(1, Ordering::Relaxed) % candidates.len();
        Some(index)
    }

    fn policy(&self) -> SelectionPolicy {
        SelectionPolicy::RoundRobin
    }
}

/// Picks the reader whose last selection is oldest.
/// Ties go to the first candidate in configured order.
#[derive(Debug, Default)]
pub struct LeastRecentlyUsed;

impl LeastRecentlyUsed {
    pub fn new() -> Self {
        Self
    }
}

impl ReaderSelector for LeastRecentlyUsed {
    fn select(&self, candidates: &[&Arc<Endpoint>]) -> Option<usize> {
        candidates
            .iter()
            .enumerate()
            .min_by_key(|(_, e)| e.last_selected())
            .map(|(index, _)| index)
    }

    fn policy(&self) -> SelectionPolicy {
        SelectionPolicy::LeastRecentlyUsed
    }
}

/// Picks the reader with the fewest in-flight operations,
/// breaking ties by least recent selection
#[derive(Debug, Default)]
pub struct LeastInFlight;

impl LeastInFlight {
    pub fn new() -> Self {
        Self
    }
}

impl ReaderSelector for LeastInFlight {
    fn select(&self, candidates: &[&Arc<Endpoint>]) -> Option<usize> {
        candidates
            .iter()
            .enumerate()
            .min_by_key(|(_, e)| (e.in_flight(), e.last_selected()))
            .map(|(index, _)| index)
    }

    fn policy(&self) -> SelectionPolicy {
        SelectionPolicy::LeastInFlight
    }
}
