//! Eligibility rules for forwarding bookings
//!
//! A booking is eligible iff it was created strictly after the automation
//! cutoff and its id has not already been forwarded. Bookings created at or
//! before the cutoff predate the automation and must never be processed.

use crate::domain::types::{Booking, BookingId};
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashSet};

/// Set of booking ids that have been successfully forwarded
pub type ProcessedSet = BTreeSet<BookingId>;

/// Check a single booking against the cutoff and processed rules
pub fn is_eligible(booking: &Booking, processed: &ProcessedSet, cutoff: DateTime<Utc>) -> bool {
    booking.created_at > cutoff && !processed.contains(&booking.id)
}

/// Narrow fetched bookings to the eligible subset, preserving input order
///
/// Repeated ids within one batch keep only their first occurrence.
pub fn filter_eligible(
    bookings: &[Booking],
    processed: &ProcessedSet,
    cutoff: DateTime<Utc>,
) -> Vec<Booking> {
    let mut seen: HashSet<&BookingId> = HashSet::with_capacity(bookings.len());
    bookings
        .iter()
        .filter(|b| is_eligible(b, processed, cutoff))
        .filter(|b| seen.insert(&b.id))
        .cloned()
        .collect()
}
