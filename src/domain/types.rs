//! Shared types for the booking sync

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Canonical string form of an upstream booking identifier
///
/// The booking API returns ids as either JSON strings or integers; both
/// collapse to the same string so `42` and `"42"` are the same booking.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookingId(pub String);

impl BookingId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BookingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for BookingId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Deserialize an id that can be a string or an integer
pub fn deserialize_booking_id<'de, D>(deserializer: D) -> Result<BookingId, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::{self, Visitor};

    struct BookingIdVisitor;

    impl<'de> Visitor<'de> for BookingIdVisitor {
        type Value = BookingId;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a string or integer booking id")
        }

        fn visit_str<E>(self, value: &str) -> Result<BookingId, E>
        where
            E: de::Error,
        {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return Err(E::custom("empty booking id"));
            }
            Ok(BookingId(trimmed.to_string()))
        }

        fn visit_u64<E>(self, value: u64) -> Result<BookingId, E>
        where
            E: de::Error,
        {
            Ok(BookingId(value.to_string()))
        }

        fn visit_i64<E>(self, value: i64) -> Result<BookingId, E>
        where
            E: de::Error,
        {
            Ok(BookingId(value.to_string()))
        }
    }

    deserializer.deserialize_any(BookingIdVisitor)
}

/// Person who made the booking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Contact {
    pub fn new(email: impl Into<String>, name: Option<String>) -> Self {
        Self { email: email.into(), name }
    }
}

/// One appointment as reported by the booking API
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Booking {
    pub id: BookingId,
    /// Creation time as reported upstream, never the local fetch time
    pub created_at: DateTime<Utc>,
    pub contact: Contact,
}

impl Booking {
    pub fn new(id: impl Into<String>, created_at: DateTime<Utc>, contact: Contact) -> Self {
        Self { id: BookingId(id.into()), created_at, contact }
    }
}

/// What started a sync cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleTrigger {
    Timer,
    Manual,
}

impl CycleTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleTrigger::Timer => "timer",
            CycleTrigger::Manual => "manual",
        }
    }
}

/// Orchestrator-owned timing state
#[derive(Debug, Clone, Serialize)]
pub struct SyncState {
    pub last_check: Option<DateTime<Utc>>,
    pub next_check: Option<DateTime<Utc>>,
    automation_cutoff: DateTime<Utc>,
}

impl SyncState {
    pub fn new(automation_cutoff: DateTime<Utc>) -> Self {
        Self { last_check: None, next_check: None, automation_cutoff }
    }

    /// Fixed for the process lifetime
    pub fn automation_cutoff(&self) -> DateTime<Utc> {
        self.automation_cutoff
    }
}

/// Summary of one completed (or aborted) cycle
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle_id: String,
    pub trigger: CycleTrigger,
    pub fetched: usize,
    pub eligible: usize,
    pub submitted: usize,
    pub failed: usize,
    pub fetch_failed: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Result of asking the orchestrator to run a cycle
#[derive(Debug, Clone)]
pub enum CycleOutcome {
    Completed(CycleReport),
    /// Another cycle held the run guard; the trigger was dropped
    AlreadyRunning,
}

impl CycleOutcome {
    pub fn report(&self) -> Option<&CycleReport> {
        match self {
            CycleOutcome::Completed(report) => Some(report),
            CycleOutcome::AlreadyRunning => None,
        }
    }
}
