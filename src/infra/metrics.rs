//! Lock-free sync counters
//!
//! NOTE: All atomics use Relaxed ordering intentionally. These are statistical
//! counters only; cycle exclusion is handled by the orchestrator's run guard.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Lock-free metrics collector
#[derive(Debug, Default)]
pub struct Metrics {
    /// Cycles that acquired the run guard
    cycles_total: AtomicU64,
    /// Triggers dropped because a cycle was already running
    cycles_skipped: AtomicU64,
    /// Booking fetches that failed (transport, status or decode)
    fetch_failures: AtomicU64,
    /// Bookings returned by the source across all cycles
    bookings_fetched: AtomicU64,
    /// Bookings that passed the eligibility filter
    bookings_eligible: AtomicU64,
    submissions_ok: AtomicU64,
    submissions_failed: AtomicU64,
    /// Processed-set writes that did not reach disk
    persist_failures: AtomicU64,
}

/// Point-in-time copy of all counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub cycles_total: u64,
    pub cycles_skipped: u64,
    pub fetch_failures: u64,
    pub bookings_fetched: u64,
    pub bookings_eligible: u64,
    pub submissions_ok: u64,
    pub submissions_failed: u64,
    pub persist_failures: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_cycle(&self) {
        self.cycles_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_cycle_skipped(&self) {
        self.cycles_skipped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_fetch_failure(&self) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_fetched(&self, count: usize) {
        self.bookings_fetched.fetch_add(count as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_eligible(&self, count: usize) {
        self.bookings_eligible.fetch_add(count as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_submission(&self, success: bool) {
        if success {
            self.submissions_ok.fetch_add(1, Ordering::Relaxed);
        } else {
            self.submissions_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_persist_failure(&self) {
        self.persist_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Load all counters without resetting
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            cycles_total: self.cycles_total.load(Ordering::Relaxed),
            cycles_skipped: self.cycles_skipped.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            bookings_fetched: self.bookings_fetched.load(Ordering::Relaxed),
            bookings_eligible: self.bookings_eligible.load(Ordering::Relaxed),
            submissions_ok: self.submissions_ok.load(Ordering::Relaxed),
            submissions_failed: self.submissions_failed.load(Ordering::Relaxed),
            persist_failures: self.persist_failures.load(Ordering::Relaxed),
        }
    }
}

impl MetricsSnapshot {
    /// Log snapshot as a structured event
    pub fn log(&self) {
        info!(
            cycles_total = %self.cycles_total,
            cycles_skipped = %self.cycles_skipped,
            fetch_failures = %self.fetch_failures,
            bookings_fetched = %self.bookings_fetched,
            bookings_eligible = %self.bookings_eligible,
            submissions_ok = %self.submissions_ok,
            submissions_failed = %self.submissions_failed,
            persist_failures = %self.persist_failures,
            "metrics"
        );
    }
}
