//! Booking API client
//!
//! Fetches bookings page by page until the API reports no more results.
//! Wire format:
//!
//! ```text
//! GET {base_url}/bookings?page=1&afterStart=2025-07-26T21:00:00Z
//! Authorization: Bearer <api_key>
//!
//! {"bookings": [{"id": 17, "createdAt": "...", "attendees": [{"email": "...", "name": "..."}]}],
//!  "hasMore": false}
//! ```
//!
//! A bare JSON array of bookings is accepted as a single final page. Records
//! that cannot be decoded or carry no contact email are skipped individually.

use crate::domain::types::deserialize_booking_id;
use crate::domain::{Booking, BookingId, Contact};
use crate::infra::config::Config;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("booking API request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("booking API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("booking API response could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("booking API still reported more results after {max_pages} pages")]
    PageLimit { max_pages: u32 },
}

/// Anything that can list the current bookings
#[async_trait]
pub trait BookingSource: Send + Sync {
    /// Fetch all candidate bookings, fully draining pagination
    async fn fetch_bookings(&self) -> Result<Vec<Booking>, SourceError>;
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PageBody {
    Paged {
        bookings: Vec<serde_json::Value>,
        #[serde(default, rename = "hasMore")]
        has_more: bool,
    },
    Bare(Vec<serde_json::Value>),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBooking {
    #[serde(deserialize_with = "deserialize_booking_id")]
    id: BookingId,
    created_at: DateTime<Utc>,
    #[serde(default)]
    attendees: Vec<RawAttendee>,
}

#[derive(Debug, Deserialize)]
struct RawAttendee {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

impl RawBooking {
    /// First attendee with a usable email becomes the contact
    fn into_booking(self) -> Option<Booking> {
        let attendee = self.attendees.into_iter().find_map(|a| {
            let email = a.email?.trim().to_string();
            if email.is_empty() {
                return None;
            }
            let name = a.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
            Some(Contact::new(email, name))
        })?;

        Some(Booking { id: self.id, created_at: self.created_at, contact: attendee })
    }
}

/// One decoded page of results
#[derive(Debug)]
pub struct BookingPage {
    pub bookings: Vec<Booking>,
    pub has_more: bool,
    /// Records dropped because they were malformed or had no email
    pub skipped: usize,
}

/// Decode a response body into bookings
pub fn parse_page(body: &[u8]) -> Result<BookingPage, SourceError> {
    let (records, has_more) = match serde_json::from_slice::<PageBody>(body)? {
        PageBody::Paged { bookings, has_more } => (bookings, has_more),
        PageBody::Bare(bookings) => (bookings, false),
    };

    let mut bookings = Vec::with_capacity(records.len());
    let mut skipped = 0;
    for record in records {
        match serde_json::from_value::<RawBooking>(record) {
            Ok(raw) => {
                let id = raw.id.clone();
                match raw.into_booking() {
                    Some(booking) => bookings.push(booking),
                    None => {
                        warn!(booking_id = %id, "booking_without_email_skipped");
                        skipped += 1;
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "booking_record_malformed");
                skipped += 1;
            }
        }
    }

    Ok(BookingPage { bookings, has_more, skipped })
}

/// HTTP implementation against the booking API
pub struct HttpBookingSource {
    client: reqwest::Client,
    bookings_url: String,
    api_key: Option<String>,
    max_pages: u32,
    start_filter: Option<(String, String)>,
}

impl HttpBookingSource {
    pub fn new(config: &Config) -> Result<Self, SourceError> {
        // Create HTTP client once for reuse (connection pooling)
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.source_timeout_ms()))
            .build()?;

        let param = config.source_start_time_param();
        let start_filter = (!param.is_empty()).then(|| {
            (
                param.to_string(),
                config.automation_cutoff().to_rfc3339_opts(SecondsFormat::Secs, true),
            )
        });

        Ok(Self {
            client,
            bookings_url: format!("{}/bookings", config.source_base_url()),
            api_key: config.source_api_key().map(str::to_string),
            max_pages: config.source_max_pages(),
            start_filter,
        })
    }

    async fn fetch_page(&self, page: u32) -> Result<BookingPage, SourceError> {
        let mut query: Vec<(&str, String)> = vec![("page", page.to_string())];
        if let Some((param, value)) = &self.start_filter {
            query.push((param.as_str(), value.clone()));
        }

        let mut request = self.client.get(&self.bookings_url).query(&query);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Status { status: status.as_u16(), body: truncate(&body, 200) });
        }

        let body = response.bytes().await?;
        parse_page(&body)
    }
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[async_trait]
impl BookingSource for HttpBookingSource {
    async fn fetch_bookings(&self) -> Result<Vec<Booking>, SourceError> {
        let mut all = Vec::new();

        for page in 1..=self.max_pages {
            let result = self.fetch_page(page).await?;
            debug!(
                page = %page,
                bookings = %result.bookings.len(),
                skipped = %result.skipped,
                has_more = %result.has_more,
                "booking_page_fetched"
            );
            all.extend(result.bookings);

            if !result.has_more {
                return Ok(all);
            }
        }

        // Never hand back a partial listing
        warn!(max_pages = %self.max_pages, fetched = %all.len(), "booking_page_limit_reached");
        Err(SourceError::PageLimit { max_pages: self.max_pages })
    }
}
