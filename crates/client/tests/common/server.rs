//! Loopback axum server for exercising the real HTTP clients.
//!
//! Every request goes through one fallback handler that records it and looks
//! up the reply by method and path-and-query. Unknown routes get a 404.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use futures::{stream, StreamExt};
use reqwest::Url;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// One server-sent event.
#[derive(Debug, Clone)]
pub struct Frame {
    pub event: Option<String>,
    pub data: String,
}

impl Frame {
    pub fn data(data: &str) -> Self {
        Self {
            event: None,
            data: data.to_string(),
        }
    }

    pub fn named(event: &str, data: &str) -> Self {
        Self {
            event: Some(event.to_string()),
            data: data.to_string(),
        }
    }

    fn to_event(&self) -> Event {
        let event = Event::default().data(&self.data);
        match &self.event {
            Some(kind) => event.event(kind),
            None => event,
        }
    }
}

/// How the server answers one route.
#[derive(Debug, Clone)]
pub enum Reply {
    /// A complete JSON response.
    Json {
        status: u16,
        body: serde_json::Value,
    },
    /// An event stream that sends each frame and then ends.
    Events(Vec<Frame>),
    /// An event stream that sends each frame and then stays open until the
    /// client goes away.
    HoldEvents(Vec<Frame>),
    /// An event stream written as raw chunks, a short pause between each,
    /// then ended. For framing the SSE encoder would normalise away.
    Raw(Vec<String>),
}

impl Reply {
    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Reply::Json { status, body }
    }

    /// Unnamed events carrying `data`.
    pub fn events(data: &[&str]) -> Self {
        Reply::Events(data.iter().map(|d| Frame::data(d)).collect())
    }

    pub fn hold_events(data: &[&str]) -> Self {
        Reply::HoldEvents(data.iter().map(|d| Frame::data(d)).collect())
    }

    pub fn raw(chunks: &[&str]) -> Self {
        Reply::Raw(chunks.iter().map(|c| c.to_string()).collect())
    }
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    /// Path and query as sent.
    pub target: String,
    /// Lower-cased header names.
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("request body is not JSON")
    }
}

struct ServerState {
    routes: HashMap<(String, String), Reply>,
    requests: Mutex<Vec<RecordedRequest>>,
    disconnects: Arc<AtomicUsize>,
}

/// Counts a held stream as hung up once its body is dropped.
struct HangupGuard(Arc<AtomicUsize>);

impl Drop for HangupGuard {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct MockServer {
    base: Url,
    state: Arc<ServerState>,
    task: JoinHandle<()>,
}

impl MockServer {
    /// Serve `(method, target, reply)` routes on an ephemeral port.
    pub async fn start(routes: Vec<(&str, &str, Reply)>) -> Self {
        let state = Arc::new(ServerState {
            routes: routes
                .into_iter()
                .map(|(method, target, reply)| ((method.to_string(), target.to_string()), reply))
                .collect(),
            requests: Mutex::new(Vec::new()),
            disconnects: Arc::new(AtomicUsize::new(0)),
        });

        let app = Router::new()
            .fallback(handle)
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base: Url::parse(&format!("http://{addr}/")).unwrap(),
            state,
            task,
        }
    }

    /// Server root, with a trailing slash.
    pub fn base(&self) -> Url {
        self.base.clone()
    }

    pub fn url(&self, path: &str) -> Url {
        self.base.join(path).unwrap()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    /// The last request sent to `target`.
    pub fn request_to(&self, target: &str) -> Option<RecordedRequest> {
        self.requests()
            .into_iter()
            .rev()
            .find(|r| r.target == target)
    }

    /// Held event streams the client has hung up on.
    pub fn disconnects(&self) -> usize {
        self.state.disconnects.load(Ordering::SeqCst)
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// A client that ignores proxy settings from the environment.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

async fn handle(State(state): State<Arc<ServerState>>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let method = parts.method.as_str().to_string();
    let target = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| parts.uri.path())
        .to_string();
    let headers = parts
        .headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                value.to_str().unwrap_or_default().to_string(),
            )
        })
        .collect();
    let body = to_bytes(body, usize::MAX).await.unwrap_or_default().to_vec();

    let reply = state.routes.get(&(method.clone(), target.clone())).cloned();
    state.requests.lock().unwrap().push(RecordedRequest {
        method,
        target,
        headers,
        body,
    });

    match reply {
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"detail": "Not Found"})),
        )
            .into_response(),
        Some(Reply::Json { status, body }) => {
            (StatusCode::from_u16(status).unwrap(), Json(body)).into_response()
        }
        Some(Reply::Events(frames)) => {
            let events = frames
                .iter()
                .map(|frame| Ok::<_, Infallible>(frame.to_event()))
                .collect::<Vec<_>>();
            Sse::new(stream::iter(events)).into_response()
        }
        Some(Reply::HoldEvents(frames)) => {
            let guard = HangupGuard(Arc::clone(&state.disconnects));
            let events = stream::unfold(
                (frames.into_iter(), guard),
                |(mut frames, guard)| async move {
                    match frames.next() {
                        Some(frame) => Some((Ok::<_, Infallible>(frame.to_event()), (frames, guard))),
                        None => {
                            // Hold the guard until the body is dropped.
                            std::future::pending::<()>().await;
                            drop(guard);
                            None
                        }
                    }
                },
            );
            // Keep-alive writes make a vanished client show up promptly.
            Sse::new(events)
                .keep_alive(KeepAlive::new().interval(Duration::from_millis(20)))
                .into_response()
        }
        Some(Reply::Raw(chunks)) => {
            let chunks = stream::iter(chunks).then(|chunk| async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok::<_, Infallible>(chunk)
            });
            ([(CONTENT_TYPE, "text/event-stream")], Body::from_stream(chunks)).into_response()
        }
    }
}
