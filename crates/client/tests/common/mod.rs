#![allow(dead_code)]

pub mod server;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use jobstream_client::{SseEvent, StatusSource, StatusStream, TrackerSnapshot, TransportError};
use jobstream_core::JobId;
use tokio::sync::{mpsc, watch};

/// Sender half feeding one fake subscription.
pub type EventSender = mpsc::UnboundedSender<Result<SseEvent, TransportError>>;

type EventReceiver = mpsc::UnboundedReceiver<Result<SseEvent, TransportError>>;

/// In-memory [`StatusSource`] backed by one channel per job.
///
/// Records the order in which subscriptions are opened and closed and the
/// highest number that were ever open at the same time.
#[derive(Default)]
pub struct ChannelSource {
    channels: Mutex<HashMap<String, EventReceiver>>,
    failing: Mutex<HashSet<String>>,
    open_now: Arc<AtomicUsize>,
    max_open: AtomicUsize,
    log: Arc<Mutex<Vec<String>>>,
}

impl ChannelSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a job and return the sender for its subscription.
    pub fn channel(&self, job: &str) -> EventSender {
        let (tx, rx) = mpsc::unbounded_channel();
        self.channels.lock().unwrap().insert(job.to_string(), rx);
        tx
    }

    /// Make `open` fail for this job.
    pub fn fail_open(&self, job: &str) {
        self.failing.lock().unwrap().insert(job.to_string());
    }

    pub fn open_count(&self) -> usize {
        self.open_now.load(Ordering::SeqCst)
    }

    pub fn max_open(&self) -> usize {
        self.max_open.load(Ordering::SeqCst)
    }

    /// `open:<job>` / `close:<job>` entries in the order they happened.
    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

/// Marks a subscription closed when its stream is dropped.
struct OpenGuard {
    job: String,
    open_now: Arc<AtomicUsize>,
    log: Arc<Mutex<Vec<String>>>,
}

impl Drop for OpenGuard {
    fn drop(&mut self) {
        self.open_now.fetch_sub(1, Ordering::SeqCst);
        self.log.lock().unwrap().push(format!("close:{}", self.job));
    }
}

#[async_trait]
impl StatusSource for ChannelSource {
    async fn open(&self, job_id: &JobId) -> Result<StatusStream, TransportError> {
        let job = job_id.as_str().to_string();
        if self.failing.lock().unwrap().contains(&job) {
            return Err(TransportError::Status(503));
        }

        let rx = self
            .channels
            .lock()
            .unwrap()
            .remove(&job)
            .ok_or(TransportError::Status(404))?;

        let now = self.open_now.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_open.fetch_max(now, Ordering::SeqCst);
        self.log.lock().unwrap().push(format!("open:{job}"));

        let guard = OpenGuard {
            job,
            open_now: Arc::clone(&self.open_now),
            log: Arc::clone(&self.log),
        };

        Ok(Box::pin(futures::stream::unfold(
            (rx, guard),
            |(mut rx, guard)| async move { rx.recv().await.map(|item| (item, (rx, guard))) },
        )))
    }
}

/// Wait (bounded) until the snapshot satisfies `pred`.
pub async fn wait_for(
    rx: &mut watch::Receiver<TrackerSnapshot>,
    pred: impl FnMut(&TrackerSnapshot) -> bool,
) -> TrackerSnapshot {
    tokio::time::timeout(Duration::from_secs(2), rx.wait_for(pred))
        .await
        .expect("timed out waiting for tracker snapshot")
        .expect("tracker dropped")
        .clone()
}

/// Wait (bounded) until `cond` holds.
pub async fn eventually(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Let spawned tasks run for a moment.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

pub fn message(data: &str) -> Result<SseEvent, TransportError> {
    Ok(SseEvent::message(data))
}

pub fn status_event(data: &str) -> Result<SseEvent, TransportError> {
    Ok(SseEvent::named("status", data))
}
