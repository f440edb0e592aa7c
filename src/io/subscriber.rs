//! Newsletter subscription submitter
//!
//! A `Submitter` holds an ordered list of strategies and tries them in turn
//! until one accepts the contact. Each strategy makes exactly one external
//! attempt per call; there is no retry loop here. Callers only ever see a
//! bool.

use crate::domain::Contact;
use crate::infra::config::Config;
use async_trait::async_trait;
use serde::Serialize;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("subscribe request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("subscribe endpoint returned {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// One way of pushing a contact to the newsletter
#[async_trait]
pub trait SubmissionStrategy: Send + Sync {
    /// Short label used in logs
    fn name(&self) -> &str;

    /// Make a single submission attempt
    async fn attempt(&self, contact: &Contact) -> Result<(), SubmitError>;
}

#[derive(Serialize)]
struct SubscribeBody<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

/// How the contact is encoded in the POST body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyEncoding {
    Json,
    Form,
}

/// Plain HTTP POST to a subscribe endpoint
pub struct HttpSubscribeStrategy {
    label: String,
    client: reqwest::Client,
    url: String,
    encoding: BodyEncoding,
}

impl HttpSubscribeStrategy {
    pub fn new(
        label: &str,
        url: &str,
        encoding: BodyEncoding,
        timeout: Duration,
    ) -> Result<Self, SubmitError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { label: label.to_string(), client, url: url.to_string(), encoding })
    }
}

#[async_trait]
impl SubmissionStrategy for HttpSubscribeStrategy {
    fn name(&self) -> &str {
        &self.label
    }

    async fn attempt(&self, contact: &Contact) -> Result<(), SubmitError> {
        let body = SubscribeBody { email: &contact.email, name: contact.name.as_deref() };

        let request = self.client.post(&self.url);
        let request = match self.encoding {
            BodyEncoding::Json => request.json(&body),
            BodyEncoding::Form => request.form(&body),
        };

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(SubmitError::Rejected {
            status: status.as_u16(),
            body: body.chars().take(200).collect(),
        })
    }
}

/// Ordered list of strategies, first success wins
pub struct Submitter {
    strategies: Vec<Box<dyn SubmissionStrategy>>,
}

impl Submitter {
    pub fn new(strategies: Vec<Box<dyn SubmissionStrategy>>) -> Self {
        Self { strategies }
    }

    /// Primary JSON endpoint, plus the form-encoded fallback when configured
    pub fn from_config(config: &Config) -> Result<Self, SubmitError> {
        let timeout = Duration::from_millis(config.newsletter_timeout_ms());
        let primary = HttpSubscribeStrategy::new(
            "primary",
            config.subscribe_url(),
            BodyEncoding::Json,
            timeout,
        )?;
        let mut strategies: Vec<Box<dyn SubmissionStrategy>> = vec![Box::new(primary)];

        if let Some(fallback) = config.fallback_url() {
            strategies.push(Box::new(HttpSubscribeStrategy::new(
                "fallback",
                fallback,
                BodyEncoding::Form,
                timeout,
            )?));
        }

        Ok(Self::new(strategies))
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Submit one contact; true once any strategy accepts it
    pub async fn submit(&self, email: &str, name: Option<&str>) -> bool {
        let contact = Contact::new(email, name.map(str::to_string));
        self.submit_contact(&contact).await
    }

    pub async fn submit_contact(&self, contact: &Contact) -> bool {
        for strategy in &self.strategies {
            let start = Instant::now();
            match strategy.attempt(contact).await {
                Ok(()) => {
                    info!(
                        email = %contact.email,
                        strategy = %strategy.name(),
                        latency_ms = %start.elapsed().as_millis(),
                        "subscription_submitted"
                    );
                    return true;
                }
                Err(e) => {
                    warn!(
                        email = %contact.email,
                        strategy = %strategy.name(),
                        latency_ms = %start.elapsed().as_millis(),
                        error = %e,
                        "subscription_attempt_failed"
                    );
                }
            }
        }

        warn!(email = %contact.email, strategies = %self.strategies.len(), "subscription_failed");
        false
    }
}
