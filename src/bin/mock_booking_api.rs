//! Mock booking API and newsletter endpoint
//!
//! Serves bookings from a JSON fixture and accepts subscriptions, for local
//! end-to-end runs of booking-sync.
//!
//! Endpoints:
//! - `GET /bookings?page=N` - fixture bookings, `page_size` per page, with `hasMore`
//! - `POST /subscribe` - JSON `{email, name}`
//! - `POST /subscribe/form` - form-encoded `email=..&name=..`
//!
//! Every Nth subscription is rejected with 503 when `--fail-every N` is set.
//!
//! Usage:
//!   cargo run --bin mock-booking-api -- --port 9100 --fixture bookings.json

use bytes::Bytes;
use chrono::{Duration as ChronoDuration, SecondsFormat, Utc};
use clap::Parser;
use http_body_util::{BodyExt, Full};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "mock-booking-api")]
#[command(about = "Mock booking API and newsletter endpoint for local runs")]
struct Args {
    /// TCP port to listen on
    #[arg(short, long, default_value = "9100")]
    port: u16,

    /// JSON file with an array of booking records (generated sample if omitted)
    #[arg(short, long)]
    fixture: Option<String>,

    /// Bookings per page
    #[arg(long, default_value = "2")]
    page_size: usize,

    /// Reject every Nth subscription (0 disables)
    #[arg(long, default_value = "0")]
    fail_every: u64,
}

struct MockState {
    bookings: Vec<Value>,
    page_size: usize,
    fail_every: u64,
    subscriptions: AtomicU64,
}

/// A few bookings on both sides of the default cutoff
fn sample_bookings() -> Vec<Value> {
    let now = Utc::now();
    let at = |hours_ago: i64| {
        (now - ChronoDuration::hours(hours_ago)).to_rfc3339_opts(SecondsFormat::Secs, true)
    };
    vec![
        json!({"id": 1, "createdAt": "2025-07-26T20:00:00Z",
               "attendees": [{"email": "early@example.com", "name": "Early Bird"}]}),
        json!({"id": 2, "createdAt": at(48),
               "attendees": [{"email": "ann@example.com", "name": "Ann"}]}),
        json!({"id": "3", "createdAt": at(5), "attendees": [{"email": "bob@example.com"}]}),
        json!({"id": 4, "createdAt": at(1),
               "attendees": [{"email": "cy@example.com", "name": "Cy"}]}),
    ]
}

fn load_fixture(path: &str) -> anyhow::Result<Vec<Value>> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn page_param(query: Option<&str>) -> usize {
    query
        .into_iter()
        .flat_map(|q| q.split('&'))
        .find_map(|pair| pair.strip_prefix("page="))
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(1)
        .max(1)
}

fn json_response(status: StatusCode, body: Value) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .expect("static response should not fail")
}

fn bookings_page(state: &MockState, page: usize) -> Value {
    let size = state.page_size.max(1);
    let start = (page - 1).saturating_mul(size).min(state.bookings.len());
    let end = (start + size).min(state.bookings.len());
    json!({
        "bookings": &state.bookings[start..end],
        "hasMore": end < state.bookings.len(),
    })
}

/// Pull the email out of a JSON or form body
fn extract_email(body: &[u8], form: bool) -> Option<String> {
    if form {
        let text = std::str::from_utf8(body).ok()?;
        let raw = text.split('&').find_map(|pair| pair.strip_prefix("email="))?;
        // Form encoding writes spaces as '+'
        return urlencoding::decode(&raw.replace('+', " ")).ok().map(|v| v.into_owned());
    }
    let value: Value = serde_json::from_slice(body).ok()?;
    value.get("email")?.as_str().map(str::to_string)
}

async fn handle_subscribe(
    req: Request<hyper::body::Incoming>,
    state: Arc<MockState>,
    form: bool,
) -> Response<Full<Bytes>> {
    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(error = %e, "subscribe_body_read_failed");
            return json_response(StatusCode::BAD_REQUEST, json!({"ok": false}));
        }
    };

    let Some(email) = extract_email(&body, form) else {
        let error = json!({"ok": false, "error": "email required"});
        return json_response(StatusCode::BAD_REQUEST, error);
    };

    let n = state.subscriptions.fetch_add(1, Ordering::Relaxed) + 1;
    if state.fail_every > 0 && n % state.fail_every == 0 {
        warn!(email = %email, n = %n, "subscribe_rejected");
        return json_response(StatusCode::SERVICE_UNAVAILABLE, json!({"ok": false}));
    }

    info!(email = %email, form = %form, n = %n, "subscribe_accepted");
    json_response(StatusCode::OK, json!({"ok": true}))
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<MockState>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = match (&method, path.as_str()) {
        (&Method::GET, "/bookings") => {
            let page = page_param(req.uri().query());
            info!(page = %page, "bookings_requested");
            json_response(StatusCode::OK, bookings_page(&state, page))
        }
        (&Method::POST, "/subscribe") => handle_subscribe(req, state, false).await,
        (&Method::POST, "/subscribe/form") => handle_subscribe(req, state, true).await,
        _ => json_response(StatusCode::NOT_FOUND, json!({"error": "not found"})),
    };
    Ok(response)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let args = Args::parse();
    let bookings = match &args.fixture {
        Some(path) => load_fixture(path)?,
        None => sample_bookings(),
    };

    let state = Arc::new(MockState {
        bookings,
        page_size: args.page_size,
        fail_every: args.fail_every,
        subscriptions: AtomicU64::new(0),
    });

    let addr = SocketAddr::from(([127, 0, 0, 1], args.port));
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, bookings = %state.bookings.len(), "mock_booking_api_listening");

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let state = state.clone();
        tokio::spawn(async move {
            let service = service_fn(move |req| handle_request(req, state.clone()));
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                warn!(error = %e, "mock_http_error");
            }
        });
    }
}
