//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `booking_source` - Booking API client (paged fetch)
//! - `subscriber` - Newsletter submission strategies
//! - `processed_store` - Durable set of forwarded booking ids
//! - `activity_log` - Human-readable activity log file
//! - `http_api` - Operational HTTP endpoint (status, trigger, logs, metrics)

pub mod activity_log;
pub mod booking_source;
pub mod http_api;
pub mod processed_store;
pub mod subscriber;

// Re-export commonly used types
pub use activity_log::ActivityLog;
pub use booking_source::{BookingSource, HttpBookingSource, SourceError};
pub use processed_store::{ProcessedStore, StoreError};
pub use subscriber::{
    BodyEncoding, HttpSubscribeStrategy, SubmissionStrategy, SubmitError, Submitter,
};
