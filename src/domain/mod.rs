//! Domain - core business types
//!
//! - `types` - Booking, Contact, SyncState, cycle reports
//! - `eligibility` - Pure cutoff / already-processed filter

pub mod eligibility;
pub mod types;

pub use eligibility::{filter_eligible, is_eligible, ProcessedSet};
pub use types::{
    Booking, BookingId, Contact, CycleOutcome, CycleReport, CycleTrigger, SyncState,
};
