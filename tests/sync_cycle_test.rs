//! End-to-end sync cycle scenarios with in-process source and strategies

use async_trait::async_trait;
use booking_sync::domain::{Booking, BookingId, Contact, CycleOutcome, CycleTrigger};
use booking_sync::infra::Metrics;
use booking_sync::io::{
    ActivityLog, BookingSource, ProcessedStore, SourceError, SubmissionStrategy, SubmitError,
    Submitter,
};
use booking_sync::services::SyncOrchestrator;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::{tempdir, TempDir};

const CUTOFF: &str = "2025-07-26T21:00:00Z";

/// Source whose response can be swapped between cycles
#[derive(Clone, Default)]
struct ScriptedSource {
    response: Arc<Mutex<Option<Vec<Booking>>>>,
}

impl ScriptedSource {
    fn returning(bookings: Vec<Booking>) -> Self {
        let source = Self::default();
        source.set(Some(bookings));
        source
    }

    /// `None` makes the next fetch fail
    fn set(&self, bookings: Option<Vec<Booking>>) {
        *self.response.lock() = bookings;
    }
}

#[async_trait]
impl BookingSource for ScriptedSource {
    async fn fetch_bookings(&self) -> Result<Vec<Booking>, SourceError> {
        match self.response.lock().clone() {
            Some(bookings) => Ok(bookings),
            None => Err(SourceError::Status { status: 504, body: "gateway timeout".to_string() }),
        }
    }
}

/// Newsletter stand-in that records every attempt
#[derive(Clone, Default)]
struct FakeNewsletter {
    attempts: Arc<Mutex<Vec<String>>>,
    failing: Arc<Mutex<HashSet<String>>>,
}

impl FakeNewsletter {
    fn fail_for(&self, email: &str) {
        self.failing.lock().insert(email.to_string());
    }

    fn recover(&self, email: &str) {
        self.failing.lock().remove(email);
    }

    fn attempts(&self) -> Vec<String> {
        self.attempts.lock().clone()
    }
}

#[async_trait]
impl SubmissionStrategy for FakeNewsletter {
    fn name(&self) -> &str {
        "fake"
    }

    async fn attempt(&self, contact: &Contact) -> Result<(), SubmitError> {
        self.attempts.lock().push(contact.email.clone());
        if self.failing.lock().contains(&contact.email) {
            return Err(SubmitError::Rejected { status: 500, body: "nope".to_string() });
        }
        Ok(())
    }
}

struct Harness {
    orchestrator: SyncOrchestrator,
    source: ScriptedSource,
    newsletter: FakeNewsletter,
    metrics: Arc<Metrics>,
    dir: TempDir,
}

impl Harness {
    fn processed_path(&self) -> PathBuf {
        self.dir.path().join("processed.json")
    }
}

fn build_with(
    dir: TempDir,
    source: ScriptedSource,
    newsletter: FakeNewsletter,
    pacing: Duration,
) -> Harness {
    let metrics = Arc::new(Metrics::new());
    let orchestrator = SyncOrchestrator::new(
        Arc::new(source.clone()),
        Submitter::new(vec![Box::new(newsletter.clone())]),
        ProcessedStore::open(dir.path().join("processed.json")),
        CUTOFF.parse().unwrap(),
        pacing,
        metrics.clone(),
        Arc::new(ActivityLog::new(dir.path().join("activity.log"))),
    );
    Harness { orchestrator, source, newsletter, metrics, dir }
}

fn harness(bookings: Vec<Booking>) -> Harness {
    build_with(
        tempdir().unwrap(),
        ScriptedSource::returning(bookings),
        FakeNewsletter::default(),
        Duration::ZERO,
    )
}

fn booking(id: &str, created: &str, email: &str) -> Booking {
    Booking::new(id, created.parse().unwrap(), Contact::new(email, None))
}

fn on_disk(path: &Path) -> Vec<String> {
    ProcessedStore::load(path).into_iter().map(|id| id.0).collect()
}

fn report(outcome: CycleOutcome) -> booking_sync::domain::CycleReport {
    match outcome {
        CycleOutcome::Completed(report) => report,
        CycleOutcome::AlreadyRunning => panic!("cycle unexpectedly skipped"),
    }
}

#[tokio::test]
async fn test_booking_before_cutoff_never_submitted() {
    let h = harness(vec![booking("A", "2025-07-26T20:00:00Z", "x@y.com")]);

    let r = report(h.orchestrator.run_cycle(CycleTrigger::Timer).await);

    assert_eq!(r.fetched, 1);
    assert_eq!(r.eligible, 0);
    assert!(h.newsletter.attempts().is_empty());
    assert!(on_disk(&h.processed_path()).is_empty());
}

#[tokio::test]
async fn test_successful_booking_recorded_and_not_resubmitted() {
    let h = harness(vec![booking("B", "2025-07-26T22:00:00Z", "a@b.com")]);

    let first = report(h.orchestrator.run_cycle(CycleTrigger::Timer).await);
    assert_eq!(first.submitted, 1);
    assert_eq!(on_disk(&h.processed_path()), vec!["B"]);

    let second = report(h.orchestrator.run_cycle(CycleTrigger::Timer).await);
    assert_eq!(second.eligible, 0);
    assert_eq!(h.newsletter.attempts(), vec!["a@b.com"]);
}

#[tokio::test]
async fn test_failed_booking_retried_next_cycle() {
    let h = harness(vec![booking("C", "2025-07-27T09:00:00Z", "c@d.com")]);
    h.newsletter.fail_for("c@d.com");

    let first = report(h.orchestrator.run_cycle(CycleTrigger::Timer).await);
    assert_eq!(first.failed, 1);
    assert!(on_disk(&h.processed_path()).is_empty());

    h.newsletter.recover("c@d.com");
    let second = report(h.orchestrator.run_cycle(CycleTrigger::Timer).await);
    assert_eq!(second.eligible, 1);
    assert_eq!(second.submitted, 1);
    assert_eq!(h.newsletter.attempts(), vec!["c@d.com", "c@d.com"]);
    assert_eq!(on_disk(&h.processed_path()), vec!["C"]);
}

#[tokio::test]
async fn test_fetch_failure_mutates_nothing() {
    let h = harness(vec![]);
    h.source.set(None);

    let r = report(h.orchestrator.run_cycle(CycleTrigger::Timer).await);

    assert!(r.fetch_failed);
    assert_eq!(r.submitted, 0);
    assert!(h.newsletter.attempts().is_empty());
    assert!(h.orchestrator.state().last_check.is_none());
    assert!(!h.processed_path().exists());
    assert_eq!(h.metrics.snapshot().fetch_failures, 1);
}

#[tokio::test]
async fn test_processed_set_survives_restart() {
    let bookings = vec![booking("B", "2025-07-26T22:00:00Z", "a@b.com")];
    let h = harness(bookings.clone());
    h.orchestrator.run_cycle(CycleTrigger::Timer).await;

    // Same state directory, fresh process
    let newsletter = FakeNewsletter::default();
    let restarted =
        build_with(h.dir, ScriptedSource::returning(bookings), newsletter.clone(), Duration::ZERO);

    assert_eq!(restarted.orchestrator.processed_count(), 1);
    let r = report(restarted.orchestrator.run_cycle(CycleTrigger::Timer).await);
    assert_eq!(r.eligible, 0);
    assert!(newsletter.attempts().is_empty());
}

#[tokio::test]
async fn test_integer_and_string_ids_share_identity() {
    let h = harness(vec![booking("42", "2025-07-27T09:00:00Z", "n@m.com")]);
    h.orchestrator.run_cycle(CycleTrigger::Timer).await;

    let body = br#"{"bookings":[{"id":42,"createdAt":"2025-07-27T09:00:00Z","attendees":[{"email":"n@m.com"}]}]}"#;
    let page = booking_sync::io::booking_source::parse_page(body).unwrap();
    h.source.set(Some(page.bookings));

    let r = report(h.orchestrator.run_cycle(CycleTrigger::Timer).await);
    assert_eq!(r.eligible, 0);
    assert!(ProcessedStore::load(&h.processed_path()).contains(&BookingId::from("42")));
}

#[tokio::test]
async fn test_pacing_between_submissions() {
    let bookings = vec![
        booking("1", "2025-07-27T09:00:00Z", "one@x.com"),
        booking("2", "2025-07-27T09:01:00Z", "two@x.com"),
        booking("3", "2025-07-27T09:02:00Z", "three@x.com"),
    ];
    let h = build_with(
        tempdir().unwrap(),
        ScriptedSource::returning(bookings),
        FakeNewsletter::default(),
        Duration::from_millis(50),
    );

    let start = Instant::now();
    let r = report(h.orchestrator.run_cycle(CycleTrigger::Manual).await);

    assert_eq!(r.submitted, 3);
    // Two gaps between three submissions
    assert!(start.elapsed() >= Duration::from_millis(100));
    assert_eq!(h.newsletter.attempts(), vec!["one@x.com", "two@x.com", "three@x.com"]);
}

#[tokio::test]
async fn test_concurrent_triggers_run_one_cycle() {
    let bookings = vec![
        booking("1", "2025-07-27T09:00:00Z", "one@x.com"),
        booking("2", "2025-07-27T09:01:00Z", "two@x.com"),
    ];
    let h = build_with(
        tempdir().unwrap(),
        ScriptedSource::returning(bookings),
        FakeNewsletter::default(),
        Duration::from_millis(100),
    );

    let (a, b) = tokio::join!(
        h.orchestrator.run_cycle(CycleTrigger::Timer),
        h.orchestrator.run_cycle(CycleTrigger::Manual),
    );

    let skipped = [&a, &b].iter().filter(|o| matches!(o, CycleOutcome::AlreadyRunning)).count();
    assert_eq!(skipped, 1);
    assert_eq!(h.newsletter.attempts().len(), 2);
    assert_eq!(h.metrics.snapshot().cycles_skipped, 1);
}
