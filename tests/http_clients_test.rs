//! HTTP booking source and subscriber against a local stub server

use booking_sync::domain::BookingId;
use booking_sync::infra::Config;
use booking_sync::io::{BookingSource, HttpBookingSource, SourceError, Submitter};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;

#[derive(Default)]
struct Seen {
    queries: Vec<String>,
    subscribe_bodies: Vec<(String, String)>,
}

fn respond(status: StatusCode, body: &str) -> Response<Full<Bytes>> {
    Response::builder().status(status).body(Full::new(Bytes::from(body.to_string()))).unwrap()
}

async fn stub(
    req: Request<hyper::body::Incoming>,
    seen: Arc<Mutex<Seen>>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let path = req.uri().path().to_string();
    let query = req.uri().query().unwrap_or("").to_string();
    let authorized = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == "Bearer test-key")
        .unwrap_or(false);

    let response = match (req.method().clone(), path.as_str()) {
        (Method::GET, "/bookings") if !authorized => respond(StatusCode::UNAUTHORIZED, "no key"),
        (Method::GET, "/bookings") => {
            seen.lock().queries.push(query.clone());
            if query.contains("page=1") {
                respond(
                    StatusCode::OK,
                    r#"{"bookings":[{"id":1,"createdAt":"2025-07-27T10:00:00Z","attendees":[{"email":"p1@x.com"}]}],"hasMore":true}"#,
                )
            } else {
                respond(
                    StatusCode::OK,
                    r#"{"bookings":[{"id":"2","createdAt":"2025-07-27T11:00:00Z","attendees":[{"email":"p2@x.com","name":"Two"}]}],"hasMore":false}"#,
                )
            }
        }
        (Method::POST, "/subscribe") => {
            let body = req.into_body().collect().await.unwrap().to_bytes();
            let text = String::from_utf8_lossy(&body).into_owned();
            seen.lock().subscribe_bodies.push(("json".into(), text));
            respond(StatusCode::INTERNAL_SERVER_ERROR, "primary down")
        }
        (Method::POST, "/subscribe/form") => {
            let body = req.into_body().collect().await.unwrap().to_bytes();
            let text = String::from_utf8_lossy(&body).into_owned();
            seen.lock().subscribe_bodies.push(("form".into(), text));
            respond(StatusCode::OK, "{}")
        }
        _ => respond(StatusCode::NOT_FOUND, ""),
    };
    Ok(response)
}

async fn start_stub() -> (String, Arc<Mutex<Seen>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let seen = Arc::new(Mutex::new(Seen::default()));
    let state = seen.clone();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else { return };
            let state = state.clone();
            tokio::spawn(async move {
                let service = service_fn(move |req| stub(req, state.clone()));
                let _ = http1::Builder::new().serve_connection(TokioIo::new(stream), service).await;
            });
        }
    });

    (base, seen)
}

fn config_for(base: &str, api_key: Option<&str>) -> Config {
    let key_line = api_key.map(|k| format!("api_key = \"{k}\"")).unwrap_or_default();
    let toml = format!(
        r#"
[source]
base_url = "{base}"
{key_line}
timeout_ms = 2000

[newsletter]
subscribe_url = "{base}/subscribe"
fallback_url = "{base}/subscribe/form"
timeout_ms = 2000
"#
    );
    Config::from_toml_str(&toml, "inline").unwrap()
}

#[tokio::test]
async fn test_fetch_drains_all_pages_with_auth_and_cutoff_filter() {
    let (base, seen) = start_stub().await;
    let source = HttpBookingSource::new(&config_for(&base, Some("test-key"))).unwrap();

    let bookings = source.fetch_bookings().await.unwrap();

    let ids: Vec<BookingId> = bookings.iter().map(|b| b.id.clone()).collect();
    assert_eq!(ids, vec![BookingId::from("1"), BookingId::from("2")]);
    assert_eq!(bookings[1].contact.name.as_deref(), Some("Two"));

    let queries = seen.lock().queries.clone();
    assert_eq!(queries.len(), 2);
    assert!(queries[0].contains("afterStart=2025-07-26T21%3A00%3A00Z"));
    assert!(queries[1].contains("page=2"));
}

#[tokio::test]
async fn test_fetch_rejected_status_is_error() {
    let (base, _seen) = start_stub().await;
    let source = HttpBookingSource::new(&config_for(&base, None)).unwrap();

    let result = source.fetch_bookings().await;
    assert!(matches!(result, Err(SourceError::Status { status: 401, .. })));
}

#[tokio::test]
async fn test_submitter_falls_back_to_form_endpoint() {
    let (base, seen) = start_stub().await;
    let submitter = Submitter::from_config(&config_for(&base, Some("test-key"))).unwrap();

    assert!(submitter.submit("new@x.com", Some("New Person")).await);

    let bodies = seen.lock().subscribe_bodies.clone();
    assert_eq!(bodies.len(), 2);
    assert_eq!(bodies[0].0, "json");
    assert!(bodies[0].1.contains(r#""email":"new@x.com""#));
    assert_eq!(bodies[1].0, "form");
    assert!(bodies[1].1.contains("email=new%40x.com"));
    assert!(bodies[1].1.contains("name=New+Person"));
}

fn page_body(page: u32, total_pages: u32) -> String {
    format!(
        r#"{{"bookings":[{{"id":{page},"createdAt":"2025-07-27T10:00:00Z","attendees":[{{"email":"p{page}@x.com"}}]}}],"hasMore":{}}}"#,
        page < total_pages
    )
}

/// Serves one booking per page and reports more results until `total_pages`
async fn start_paged_stub(total_pages: u32) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else { return };
            tokio::spawn(async move {
                let service = service_fn(move |req: Request<hyper::body::Incoming>| async move {
                    let page = req
                        .uri()
                        .query()
                        .unwrap_or("")
                        .split('&')
                        .find_map(|kv| kv.strip_prefix("page="))
                        .and_then(|v| v.parse::<u32>().ok())
                        .unwrap_or(1);
                    Ok::<_, Infallible>(respond(StatusCode::OK, &page_body(page, total_pages)))
                });
                let _ = http1::Builder::new().serve_connection(TokioIo::new(stream), service).await;
            });
        }
    });

    base
}

/// Accepts connections and never answers
async fn start_silent_stub() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    base
}

fn short_timeout_config(base: &str) -> Config {
    let toml = format!(
        r#"
[source]
base_url = "{base}"
api_key = "test-key"
timeout_ms = 200

[newsletter]
subscribe_url = "{base}/subscribe"
fallback_url = "{base}/subscribe/form"
timeout_ms = 200
"#
    );
    Config::from_toml_str(&toml, "inline").unwrap()
}

#[tokio::test]
async fn test_fetch_drains_twenty_five_pages() {
    let base = start_paged_stub(25).await;
    let source = HttpBookingSource::new(&config_for(&base, Some("test-key"))).unwrap();

    let bookings = source.fetch_bookings().await.unwrap();

    assert_eq!(bookings.len(), 25);
    assert_eq!(bookings[24].id, BookingId::from("25"));
}

#[tokio::test]
async fn test_fetch_page_limit_is_error_not_partial_result() {
    let base = start_paged_stub(10).await;
    let toml = format!(
        r#"
[source]
base_url = "{base}"
max_pages = 3

[newsletter]
subscribe_url = "{base}/subscribe"
"#
    );
    let config = Config::from_toml_str(&toml, "inline").unwrap();
    let source = HttpBookingSource::new(&config).unwrap();

    let result = source.fetch_bookings().await;
    assert!(matches!(result, Err(SourceError::PageLimit { max_pages: 3 })));
}

#[tokio::test]
async fn test_fetch_times_out_against_silent_server() {
    let base = start_silent_stub().await;
    let source = HttpBookingSource::new(&short_timeout_config(&base)).unwrap();

    let started = Instant::now();
    let result = source.fetch_bookings().await;

    assert!(matches!(&result, Err(SourceError::Transport(e)) if e.is_timeout()));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_submit_times_out_against_silent_server() {
    let base = start_silent_stub().await;
    let submitter = Submitter::from_config(&short_timeout_config(&base)).unwrap();

    let started = Instant::now();
    let ok = submitter.submit("slow@x.com", None).await;

    assert!(!ok);
    // Primary and fallback each give up after their own timeout
    assert!(started.elapsed() < Duration::from_secs(2));
}
