use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{info, warn};

/// Tracks cumulative spend against a run-level ceiling.
/// Thread-safe via atomic operations for concurrent pipelines.
///
/// Spend only ever goes up: `charge` is the single mutation path and it
/// records every attempt, including ones whose result is later discarded.
/// Admission control goes through `try_reserve`, which also accounts for
/// items that are in flight but have not settled yet, so a burst of
/// admissions cannot blow past the ceiling.
pub struct BudgetLedger {
    /// Ceiling in cents. 0 = unmetered.
    ceiling_cents: u64,
    /// Cumulative spend this run in cents.
    spent_cents: AtomicU64,
    /// Estimated cents reserved by admitted-but-unsettled items.
    reserved_cents: AtomicU64,
}

impl BudgetLedger {
    pub fn new(ceiling_cents: u64) -> Self {
        Self {
            ceiling_cents,
            spent_cents: AtomicU64::new(0),
            reserved_cents: AtomicU64::new(0),
        }
    }

    /// Resume a run with spend already on the books from a prior attempt.
    pub fn with_prior_spend(ceiling_cents: u64, prior_cents: u64) -> Self {
        Self {
            ceiling_cents,
            spent_cents: AtomicU64::new(prior_cents),
            reserved_cents: AtomicU64::new(0),
        }
    }

    /// Record spend. Warns when the ceiling has been crossed by in-flight
    /// work; the charge is still recorded.
    pub fn charge(&self, cost_cents: u64) {
        let prev = self.spent_cents.fetch_add(cost_cents, Ordering::Relaxed);
        if self.ceiling_cents > 0 && prev + cost_cents > self.ceiling_cents {
            warn!(
                spent_cents = prev + cost_cents,
                ceiling_cents = self.ceiling_cents,
                "Spend has crossed the budget ceiling"
            );
        }
    }

    /// Reserve headroom for one item before admitting it. Returns false
    /// when actual spend plus outstanding reservations leave no room.
    pub fn try_reserve(&self, estimate_cents: u64) -> bool {
        if self.ceiling_cents == 0 {
            return true;
        }
        let mut reserved = self.reserved_cents.load(Ordering::Relaxed);
        loop {
            let spent = self.spent_cents.load(Ordering::Relaxed);
            if spent + reserved + estimate_cents > self.ceiling_cents {
                return false;
            }
            match self.reserved_cents.compare_exchange_weak(
                reserved,
                reserved + estimate_cents,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(actual) => reserved = actual,
            }
        }
    }

    /// Release an item's reservation once its real spend is on the books.
    pub fn settle(&self, estimate_cents: u64) {
        if self.ceiling_cents == 0 {
            return;
        }
        let _ = self
            .reserved_cents
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |r| {
                Some(r.saturating_sub(estimate_cents))
            });
    }

    /// Total spent this run.
    pub fn total_spent(&self) -> u64 {
        self.spent_cents.load(Ordering::Relaxed)
    }

    /// Budget remaining (u64::MAX if unmetered).
    pub fn remaining(&self) -> u64 {
        if self.ceiling_cents == 0 {
            return u64::MAX;
        }
        self.ceiling_cents
            .saturating_sub(self.spent_cents.load(Ordering::Relaxed))
    }

    pub fn ceiling(&self) -> u64 {
        self.ceiling_cents
    }

    /// Whether budget enforcement is active (ceiling > 0).
    pub fn is_metered(&self) -> bool {
        self.ceiling_cents > 0
    }

    /// Log budget status.
    pub fn log_status(&self) {
        if self.is_metered() {
            info!(
                spent_cents = self.total_spent(),
                remaining_cents = self.remaining(),
                ceiling_cents = self.ceiling_cents,
                "Budget status"
            );
        }
    }
}
