//! Sync orchestrator - fetch, filter, submit, record
//!
//! Owns the sync state and the processed-set store. Cycles are serialized by a
//! single-slot run guard: a trigger that arrives while a cycle is running is
//! dropped and reported as `CycleOutcome::AlreadyRunning`. The timer simply
//! fires again on its next tick; manual callers get an explicit refusal.
//!
//! Within a cycle submissions are strictly sequential with a fixed pacing
//! delay between them. Each success is persisted before the next booking is
//! touched; failures stay unrecorded and are retried on the next cycle.

use crate::domain::{
    filter_eligible, Booking, CycleOutcome, CycleReport, CycleTrigger, SyncState,
};
use crate::infra::metrics::Metrics;
use crate::io::activity_log::ActivityLog;
use crate::io::booking_source::BookingSource;
use crate::io::processed_store::ProcessedStore;
use crate::io::subscriber::Submitter;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Runs sync cycles against a booking source and a submitter
pub struct SyncOrchestrator {
    source: Arc<dyn BookingSource>,
    submitter: Submitter,
    /// Run guard; holding it is the Running state and the right to write
    store: Mutex<ProcessedStore>,
    state: RwLock<SyncState>,
    last_report: RwLock<Option<CycleReport>>,
    running: AtomicBool,
    /// Set on process shutdown; checked between submissions
    stopping: AtomicBool,
    processed_count: AtomicUsize,
    pacing: Duration,
    metrics: Arc<Metrics>,
    activity: Arc<ActivityLog>,
}

/// Clears the running flag when a cycle ends, including on early return
struct RunningFlag<'a>(&'a AtomicBool);

impl Drop for RunningFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SyncOrchestrator {
    pub fn new(
        source: Arc<dyn BookingSource>,
        submitter: Submitter,
        store: ProcessedStore,
        automation_cutoff: DateTime<Utc>,
        pacing: Duration,
        metrics: Arc<Metrics>,
        activity: Arc<ActivityLog>,
    ) -> Self {
        let processed_count = AtomicUsize::new(store.len());
        Self {
            source,
            submitter,
            store: Mutex::new(store),
            state: RwLock::new(SyncState::new(automation_cutoff)),
            last_report: RwLock::new(None),
            running: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
            processed_count,
            pacing,
            metrics,
            activity,
        }
    }

    /// Run one cycle unless another one is in flight
    pub async fn run_cycle(&self, trigger: CycleTrigger) -> CycleOutcome {
        let Ok(mut store) = self.store.try_lock() else {
            self.metrics.record_cycle_skipped();
            info!(trigger = %trigger.as_str(), "sync_cycle_skipped_already_running");
            self.activity.record(&format!(
                "{} trigger ignored: a sync cycle is already running",
                trigger.as_str()
            ));
            return CycleOutcome::AlreadyRunning;
        };
        self.running.store(true, Ordering::Release);
        let _running = RunningFlag(&self.running);

        self.metrics.record_cycle();
        let cutoff = self.state.read().automation_cutoff();
        let mut report = CycleReport {
            cycle_id: Uuid::now_v7().to_string(),
            trigger,
            fetched: 0,
            eligible: 0,
            submitted: 0,
            failed: 0,
            fetch_failed: false,
            started_at: Utc::now(),
            finished_at: Utc::now(),
        };

        info!(cycle_id = %report.cycle_id, trigger = %trigger.as_str(), "sync_cycle_started");

        let bookings = match self.source.fetch_bookings().await {
            Ok(bookings) => bookings,
            Err(e) => {
                self.metrics.record_fetch_failure();
                warn!(cycle_id = %report.cycle_id, error = %e, "booking_fetch_failed");
                self.activity.record(&format!("Booking fetch failed, skipping cycle: {}", e));
                report.fetch_failed = true;
                return self.finish(report, false);
            }
        };

        report.fetched = bookings.len();
        self.metrics.record_fetched(bookings.len());
        if bookings.is_empty() {
            info!(cycle_id = %report.cycle_id, "no_bookings_fetched");
            return self.finish(report, false);
        }

        let eligible = filter_eligible(&bookings, store.ids(), cutoff);
        report.eligible = eligible.len();
        self.metrics.record_eligible(eligible.len());

        info!(
            cycle_id = %report.cycle_id,
            fetched = %report.fetched,
            eligible = %report.eligible,
            cutoff = %cutoff.to_rfc3339(),
            "bookings_filtered"
        );

        if eligible.is_empty() {
            return self.finish(report, true);
        }

        self.activity.record(&format!(
            "Found {} new booking(s) created after {}",
            eligible.len(),
            cutoff.to_rfc3339()
        ));

        for (i, booking) in eligible.iter().enumerate() {
            if i > 0 && !self.pacing.is_zero() {
                tokio::time::sleep(self.pacing).await;
            }
            if self.stopping.load(Ordering::Acquire) {
                let remaining = eligible.len() - i;
                info!(cycle_id = %report.cycle_id, remaining = %remaining, "sync_cycle_interrupted");
                self.activity.record(&format!(
                    "Shutdown requested, {} booking(s) left for the next run",
                    remaining
                ));
                return self.finish(report, false);
            }

            if self.forward(&mut store, booking).await {
                report.submitted += 1;
            } else {
                report.failed += 1;
            }
        }

        self.finish(report, true)
    }

    /// Submit one booking and record it on success
    async fn forward(&self, store: &mut ProcessedStore, booking: &Booking) -> bool {
        let success = self.submitter.submit_contact(&booking.contact).await;
        self.metrics.record_submission(success);

        if !success {
            self.activity.record(&format!(
                "Failed to subscribe {} (booking {}), will retry next cycle",
                booking.contact.email, booking.id
            ));
            return false;
        }

        if let Err(e) = store.record_success(&booking.id) {
            self.metrics.record_persist_failure();
            error!(
                booking_id = %booking.id,
                path = %store.path().display(),
                error = %e,
                "processed_store_persist_failed"
            );
            self.activity.record(&format!(
                "ALERT: booking {} was subscribed but could not be saved as processed ({}); it may be submitted again after a restart",
                booking.id, e
            ));
        }
        self.processed_count.store(store.len(), Ordering::Relaxed);

        let who = match &booking.contact.name {
            Some(name) => format!("{} <{}>", name, booking.contact.email),
            None => booking.contact.email.clone(),
        };
        self.activity.record(&format!("Subscribed {} (booking {})", who, booking.id));
        true
    }

    fn finish(&self, mut report: CycleReport, completed: bool) -> CycleOutcome {
        report.finished_at = Utc::now();
        let duration_ms = (report.finished_at - report.started_at).num_milliseconds();
        if completed {
            self.state.write().last_check = Some(report.finished_at);
        }

        info!(
            cycle_id = %report.cycle_id,
            fetched = %report.fetched,
            eligible = %report.eligible,
            submitted = %report.submitted,
            failed = %report.failed,
            fetch_failed = %report.fetch_failed,
            duration_ms = %duration_ms,
            "sync_cycle_finished"
        );

        if report.eligible > 0 {
            self.activity.record(&format!(
                "Cycle finished: {} subscribed, {} failed",
                report.submitted, report.failed
            ));
        }

        *self.last_report.write() = Some(report.clone());
        CycleOutcome::Completed(report)
    }

    /// Stop the running cycle after its current submission
    pub fn request_shutdown(&self) {
        self.stopping.store(true, Ordering::Release);
    }

    /// Record when the scheduler expects to run next
    pub fn set_next_check(&self, at: Option<DateTime<Utc>>) {
        self.state.write().next_check = at;
    }

    pub fn state(&self) -> SyncState {
        self.state.read().clone()
    }

    pub fn last_report(&self) -> Option<CycleReport> {
        self.last_report.read().clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn processed_count(&self) -> usize {
        self.processed_count.load(Ordering::Relaxed)
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn activity(&self) -> &Arc<ActivityLog> {
        &self.activity
    }
}
