//! Operational HTTP endpoint
//!
//! Thin read/trigger wrappers around the orchestrator:
//! - `GET /health` - liveness
//! - `GET /status` - last/next check, counters, last cycle summary (JSON)
//! - `POST /sync` - run a cycle now (409 if one is already running)
//! - `GET /logs?lines=N` - tail of the activity log
//! - `GET /policy` - description of the cutoff rule (JSON)
//! - `GET /metrics` - counters in Prometheus text format
//!
//! Uses hyper for the HTTP server.

use crate::domain::{CycleOutcome, CycleTrigger};
use crate::infra::metrics::MetricsSnapshot;
use crate::services::orchestrator::SyncOrchestrator;
use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::json;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

const DEFAULT_LOG_LINES: usize = 100;
const MAX_LOG_LINES: usize = 1000;

/// Build identifier reported on /status
pub const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "+", env!("GIT_HASH"));

/// Prometheus metric type
enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

/// Write a simple metric (counter or gauge)
fn write_metric(output: &mut String, name: &str, help: &str, typ: MetricType, val: u64) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name} {val}");
}

/// Format counters in Prometheus text exposition format
fn format_prometheus_metrics(
    snap: &MetricsSnapshot,
    processed: usize,
    running: bool,
) -> String {
    let mut output = String::with_capacity(2048);

    let counters = [
        ("booking_sync_cycles_total", "Sync cycles started", snap.cycles_total),
        (
            "booking_sync_cycles_skipped_total",
            "Triggers dropped while a cycle was running",
            snap.cycles_skipped,
        ),
        ("booking_sync_fetch_failures_total", "Failed booking fetches", snap.fetch_failures),
        (
            "booking_sync_bookings_fetched_total",
            "Bookings returned by the source",
            snap.bookings_fetched,
        ),
        (
            "booking_sync_bookings_eligible_total",
            "Bookings that passed the eligibility filter",
            snap.bookings_eligible,
        ),
        (
            "booking_sync_submissions_ok_total",
            "Successful newsletter submissions",
            snap.submissions_ok,
        ),
        (
            "booking_sync_submissions_failed_total",
            "Failed newsletter submissions",
            snap.submissions_failed,
        ),
        (
            "booking_sync_persist_failures_total",
            "Processed-set writes that failed",
            snap.persist_failures,
        ),
    ];
    for (name, help, val) in counters {
        write_metric(&mut output, name, help, MetricType::Counter, val);
    }

    write_metric(
        &mut output,
        "booking_sync_processed_bookings",
        "Booking ids recorded as forwarded",
        MetricType::Gauge,
        processed as u64,
    );
    write_metric(
        &mut output,
        "booking_sync_cycle_running",
        "1 while a sync cycle is in progress",
        MetricType::Gauge,
        running as u64,
    );

    output
}

/// Parse `lines=N` from a query string, clamped to the allowed range
fn parse_lines(query: Option<&str>) -> usize {
    query
        .into_iter()
        .flat_map(|q| q.split('&'))
        .find_map(|pair| pair.strip_prefix("lines="))
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(DEFAULT_LOG_LINES)
        .min(MAX_LOG_LINES)
}

fn json_response(status: StatusCode, body: serde_json::Value) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(Full::new(Bytes::from(body.to_string())))
        .expect("static response should not fail")
}

fn text_response(status: StatusCode, content_type: &str, body: String) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Content-Type", content_type)
        .body(Full::new(Bytes::from(body)))
        .expect("static response should not fail")
}

fn status_body(orchestrator: &SyncOrchestrator, interval_secs: u64) -> serde_json::Value {
    let state = orchestrator.state();
    json!({
        "running": orchestrator.is_running(),
        "last_check": state.last_check,
        "next_check": state.next_check,
        "cutoff": state.automation_cutoff(),
        "processed_count": orchestrator.processed_count(),
        "interval_secs": interval_secs,
        "version": VERSION,
        "counters": orchestrator.metrics().snapshot(),
        "last_cycle": orchestrator.last_report(),
    })
}

fn policy_body(orchestrator: &SyncOrchestrator) -> serde_json::Value {
    let cutoff = orchestrator.state().automation_cutoff();
    json!({
        "cutoff": cutoff,
        "rule": "A booking is forwarded only if it was created strictly after the cutoff and has not been forwarded before.",
        "comparison": "created_at > cutoff",
        "timestamp_source": "booking createdAt as reported by the booking API",
        "deduplication": "successfully forwarded booking ids are stored and never submitted again",
    })
}

/// Dispatch one request; kept free of hyper's body type so it can be tested directly
pub async fn route(
    method: &Method,
    path: &str,
    query: Option<&str>,
    orchestrator: &SyncOrchestrator,
    interval_secs: u64,
) -> Response<Full<Bytes>> {
    match (method, path) {
        (&Method::GET, "/health") => {
            text_response(StatusCode::OK, "text/plain; charset=utf-8", "ok".to_string())
        }
        (&Method::GET, "/status") => {
            json_response(StatusCode::OK, status_body(orchestrator, interval_secs))
        }
        (&Method::GET, "/policy") => json_response(StatusCode::OK, policy_body(orchestrator)),
        (&Method::GET, "/logs") => {
            let lines = orchestrator.activity().tail(parse_lines(query));
            let mut body = lines.join("\n");
            if !body.is_empty() {
                body.push('\n');
            }
            text_response(StatusCode::OK, "text/plain; charset=utf-8", body)
        }
        (&Method::GET, "/metrics") => {
            let body = format_prometheus_metrics(
                &orchestrator.metrics().snapshot(),
                orchestrator.processed_count(),
                orchestrator.is_running(),
            );
            text_response(StatusCode::OK, "text/plain; version=0.0.4; charset=utf-8", body)
        }
        // Manual sync trigger - POST /sync
        (&Method::POST, "/sync") => match orchestrator.run_cycle(CycleTrigger::Manual).await {
            CycleOutcome::Completed(report) => {
                info!(cycle_id = %report.cycle_id, "manual_sync_completed");
                json_response(StatusCode::OK, json!({ "ok": true, "cycle": report }))
            }
            CycleOutcome::AlreadyRunning => json_response(
                StatusCode::CONFLICT,
                json!({ "ok": false, "error": "cycle_already_running" }),
            ),
        },
        // CORS preflight for sync
        (&Method::OPTIONS, "/sync") => Response::builder()
            .status(StatusCode::OK)
            .header("Access-Control-Allow-Origin", "*")
            .header("Access-Control-Allow-Methods", "POST, OPTIONS")
            .header("Access-Control-Allow-Headers", "Content-Type")
            .body(Full::new(Bytes::from("")))
            .expect("static response should not fail"),
        _ => text_response(
            StatusCode::NOT_FOUND,
            "text/plain; charset=utf-8",
            "Not Found".to_string(),
        ),
    }
}

/// Handle HTTP requests
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    orchestrator: Arc<SyncOrchestrator>,
    interval_secs: u64,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let uri = req.uri();
    Ok(route(req.method(), uri.path(), uri.query(), &orchestrator, interval_secs).await)
}

/// Serve the operational API on an already bound listener
pub async fn serve(
    listener: TcpListener,
    orchestrator: Arc<SyncOrchestrator>,
    interval_secs: u64,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let orchestrator = orchestrator.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let orchestrator = orchestrator.clone();
                                async move {
                                    handle_request(req, orchestrator, interval_secs).await
                                }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "ops_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "ops_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("ops_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}

/// Start the operational HTTP server
pub async fn start_ops_server(
    port: u16,
    orchestrator: Arc<SyncOrchestrator>,
    interval_secs: u64,
    shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;

    info!(port = %port, "ops_server_started");
    serve(listener, orchestrator, interval_secs, shutdown).await
}
