//! Bounded-concurrency task execution
//!
//! Runs a set of independent asynchronous work items with a hard ceiling on
//! simultaneous execution. Slots are counted by a [`tokio::sync::Semaphore`]:
//! acquire = one permit before the worker runs, release = permit drop after the
//! worker finishes (success, failure, or skip), so release is unconditional.
//! One item's failure never cancels its siblings.
//!
//! The ceiling is runtime-adjustable within [`MIN_CEILING`]..=[`MAX_CEILING`].
//! Raising it adds permits immediately; lowering it retires surplus permits as
//! they come back from finishing workers, so a mid-run change can never
//! deadlock; it only delays when the reduction takes full effect.

use crate::error::Result;
use crate::types::{BatchStats, Outcome};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Lowest allowed concurrency ceiling
pub const MIN_CEILING: usize = 1;

/// Highest allowed concurrency ceiling
pub const MAX_CEILING: usize = 20;

/// Default concurrency ceiling
pub const DEFAULT_CEILING: usize = 3;

/// Bounded-concurrency executor for fetch work
#[derive(Debug)]
pub struct TaskScheduler {
    semaphore: Arc<Semaphore>,
    ceiling: AtomicUsize,
    /// Permits still to be retired after a ceiling reduction. Finishing workers
    /// consume this debt by forgetting their permit instead of releasing it.
    shrink_debt: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
}

/// RAII guard keeping the active-worker count correct on every exit path
struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl TaskScheduler {
    /// Create a scheduler with the given ceiling, clamped to the allowed range
    pub fn new(ceiling: usize) -> Self {
        let ceiling = ceiling.clamp(MIN_CEILING, MAX_CEILING);
        Self {
            semaphore: Arc::new(Semaphore::new(ceiling)),
            ceiling: AtomicUsize::new(ceiling),
            shrink_debt: Arc::new(AtomicUsize::new(0)),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Current concurrency ceiling
    pub fn ceiling(&self) -> usize {
        self.ceiling.load(Ordering::SeqCst)
    }

    /// Number of workers currently executing
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Adjust the ceiling at runtime, clamped to the allowed range
    ///
    /// Safe to call mid-run. Increases take effect immediately; decreases take
    /// effect as in-flight workers finish.
    pub fn set_ceiling(&self, requested: usize) {
        let new = requested.clamp(MIN_CEILING, MAX_CEILING);
        let old = self.ceiling.swap(new, Ordering::SeqCst);

        if new == old {
            return;
        }

        if new > old {
            let mut grow = new - old;
            // Outstanding reduction debt cancels against the raise first
            loop {
                let debt = self.shrink_debt.load(Ordering::SeqCst);
                let cancel = debt.min(grow);
                if cancel == 0 {
                    break;
                }
                if self
                    .shrink_debt
                    .compare_exchange(debt, debt - cancel, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
                {
                    grow -= cancel;
                    break;
                }
            }
            if grow > 0 {
                self.semaphore.add_permits(grow);
            }
            tracing::info!(old, new, "Raised concurrency ceiling");
        } else {
            // Retire idle permits now; anything still in use becomes debt that
            // finishing workers pay off instead of releasing their slot.
            let mut remaining = old - new;
            while remaining > 0 {
                match self.semaphore.try_acquire() {
                    Ok(permit) => {
                        permit.forget();
                        remaining -= 1;
                    }
                    Err(_) => break,
                }
            }
            if remaining > 0 {
                self.shrink_debt.fetch_add(remaining, Ordering::SeqCst);
            }
            tracing::info!(old, new, deferred = remaining, "Lowered concurrency ceiling");
        }
    }

    /// Run a batch of work items under the concurrency ceiling
    ///
    /// Every item's worker runs to completion; failures are tallied, logged,
    /// and never abort the batch or cancel siblings.
    pub async fn run<T, F, Fut>(&self, items: Vec<T>, worker: F) -> BatchStats
    where
        T: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Outcome>> + Send + 'static,
    {
        let worker = Arc::new(worker);
        let mut join_set = JoinSet::new();

        for item in items {
            let semaphore = Arc::clone(&self.semaphore);
            let active = Arc::clone(&self.active);
            let debt = Arc::clone(&self.shrink_debt);
            let worker = Arc::clone(&worker);

            join_set.spawn(async move {
                // The semaphore is owned by the scheduler and never closed, so
                // acquisition only ever waits, it cannot fail.
                let Ok(permit) = semaphore.acquire_owned().await else {
                    return Ok(Outcome::Skipped);
                };

                let result = {
                    let _guard = ActiveGuard::enter(&active);
                    worker(item).await
                };

                // Pay down ceiling-reduction debt instead of releasing the slot
                if debt
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |d| d.checked_sub(1))
                    .is_ok()
                {
                    permit.forget();
                }
                result
            });
        }

        let mut stats = BatchStats::default();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(Ok(Outcome::Completed)) => stats.record_completed(),
                Ok(Ok(Outcome::Skipped)) => stats.record_skipped(),
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "Work item failed");
                    stats.record_failed();
                }
                Err(e) => {
                    tracing::error!(error = %e, "Work item panicked");
                    stats.record_failed();
                }
            }
        }
        stats
    }
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_CEILING)
    }
}
