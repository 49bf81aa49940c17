//! Memory pressure signals polled by the run builder.
//!
//! The run builder only asks one question: should the current batch be flushed now to avoid
//! running out of memory? Any [`MemoryPressureOracle`] can answer it. Implementations must be
//! cheap and side-effect free, they may be polled for every input row.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Polled memory pressure predicate.
pub trait MemoryPressureOracle: Send + Sync {
    /// Returns `true` if the caller must release memory before accepting more rows.
    fn low_memory_action_required(&self) -> bool;
}

impl<F> MemoryPressureOracle for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn low_memory_action_required(&self) -> bool {
        self()
    }
}

/// Oracle that never reports memory pressure. Spilling is then bounded by row count only.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMemoryPressure;

impl MemoryPressureOracle for NoMemoryPressure {
    fn low_memory_action_required(&self) -> bool {
        false
    }
}

/// Flag raised and cleared by an external memory monitor.
#[derive(Debug, Default, Clone)]
pub struct PressureFlag {
    raised: Arc<AtomicBool>,
}

impl PressureFlag {
    pub fn new() -> Self {
        PressureFlag::default()
    }

    pub fn raise(&self) {
        self.raised.store(true, Ordering::Release);
    }

    pub fn clear(&self) {
        self.raised.store(false, Ordering::Release);
    }
}

impl MemoryPressureOracle for PressureFlag {
    fn low_memory_action_required(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }
}

/// Shared byte budget with a pressure threshold.
///
/// Collaborators account their allocations with [`MemoryBudget::acquire`] and
/// [`MemoryBudget::release`]; the oracle fires once usage reaches the threshold.
#[derive(Debug, Clone)]
pub struct MemoryBudget {
    inner: Arc<BudgetInner>,
}

#[derive(Debug)]
struct BudgetInner {
    threshold: usize,
    used: AtomicUsize,
}

impl MemoryBudget {
    /// Creates a budget of `capacity` bytes that reports pressure at `threshold` (a fraction of capacity).
    pub fn new(capacity: usize, threshold: f64) -> Self {
        let threshold = (capacity as f64 * threshold.clamp(0.0, 1.0)) as usize;
        MemoryBudget {
            inner: Arc::new(BudgetInner {
                threshold,
                used: AtomicUsize::new(0),
            }),
        }
    }

    pub fn acquire(&self, bytes: usize) {
        self.inner.used.fetch_add(bytes, Ordering::AcqRel);
    }

    pub fn release(&self, bytes: usize) {
        let _ = self
            .inner
            .used
            .fetch_update(Ordering::AcqRel, Ordering::Relaxed, |cur| Some(cur.saturating_sub(bytes)));
    }

    /// Current usage (advisory).
    pub fn used_bytes(&self) -> usize {
        self.inner.used.load(Ordering::Relaxed)
    }
}

impl MemoryPressureOracle for MemoryBudget {
    fn low_memory_action_required(&self) -> bool {
        self.used_bytes() >= self.inner.threshold
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::{MemoryBudget, MemoryPressureOracle, NoMemoryPressure, PressureFlag};

    #[test]
    fn test_no_pressure() {
        assert_eq!(NoMemoryPressure.low_memory_action_required(), false);
    }

    #[test]
    fn test_flag() {
        let flag = PressureFlag::new();
        let observer = flag.clone();
        assert_eq!(observer.low_memory_action_required(), false);
        flag.raise();
        assert_eq!(observer.low_memory_action_required(), true);
        flag.clear();
        assert_eq!(observer.low_memory_action_required(), false);
    }

    #[test]
    fn test_budget_threshold() {
        let budget = MemoryBudget::new(1000, 0.8);
        budget.acquire(500);
        assert_eq!(budget.low_memory_action_required(), false);
        budget.acquire(300);
        assert_eq!(budget.low_memory_action_required(), true);
        budget.release(10_000);
        assert_eq!(budget.used_bytes(), 0);
    }

    #[test]
    fn test_closure_oracle() {
        let state = Arc::new(AtomicBool::new(true));
        let shared = state.clone();
        let oracle = move || shared.load(Ordering::Relaxed);
        assert!(oracle.low_memory_action_required());
        state.store(false, Ordering::Relaxed);
        assert!(!oracle.low_memory_action_required());
    }
}
