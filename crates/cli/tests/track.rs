//! `track_job` against a scripted status source.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use jobstream_cli::commands::{track_job, track_until};
use jobstream_cli::exit_error::{
    ExitError, EXIT_CONNECTION_LOST, EXIT_INTERRUPTED, EXIT_JOB_FAILED,
};
use jobstream_client::{SseEvent, StatusSource, StatusStream, TransportError};
use jobstream_core::JobId;

/// Replays a fixed list of messages, then ends the stream.
struct Scripted(Vec<&'static str>);

#[async_trait]
impl StatusSource for Scripted {
    async fn open(&self, _job_id: &JobId) -> Result<StatusStream, TransportError> {
        let events: Vec<Result<SseEvent, TransportError>> =
            self.0.iter().map(|data| Ok(SseEvent::message(*data))).collect();
        Ok(Box::pin(futures::stream::iter(events)))
    }
}

/// Sends a progress update every few milliseconds and never finishes.
#[derive(Default)]
struct Ticking {
    open: Arc<AtomicUsize>,
}

struct OpenGuard(Arc<AtomicUsize>);

impl Drop for OpenGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl StatusSource for Ticking {
    async fn open(&self, _job_id: &JobId) -> Result<StatusStream, TransportError> {
        self.open.fetch_add(1, Ordering::SeqCst);
        let guard = OpenGuard(Arc::clone(&self.open));
        Ok(Box::pin(futures::stream::unfold((0u32, guard), |(tick, guard)| async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            let data = format!(r#"{{"status":"in_progress","progress":{}}}"#, tick % 100);
            Some((Ok(SseEvent::message(data)), (tick + 1, guard)))
        })))
    }
}

fn exit_code(result: anyhow::Result<()>) -> Option<i32> {
    result
        .err()
        .and_then(|e| e.downcast_ref::<ExitError>().map(|exit| exit.code))
}

#[tokio::test]
async fn completed_job_succeeds() {
    let source = Arc::new(Scripted(vec![
        r#"{"status":"queued"}"#,
        r#"{"status":"completed","result":{"ok":true}}"#,
    ]));
    assert!(track_job(source, "job-1").await.is_ok());
}

#[tokio::test]
async fn failed_job_exits_with_failure_code() {
    let source = Arc::new(Scripted(vec![r#"{"status":"failed","error":"boom"}"#]));
    assert_eq!(exit_code(track_job(source, "job-1").await), Some(EXIT_JOB_FAILED));
}

#[tokio::test]
async fn lost_stream_exits_with_connection_code() {
    let source = Arc::new(Scripted(vec![r#"{"status":"started"}"#]));
    assert_eq!(
        exit_code(track_job(source, "job-1").await),
        Some(EXIT_CONNECTION_LOST)
    );
}

#[tokio::test]
async fn empty_job_id_is_rejected() {
    let source = Arc::new(Scripted(vec![]));
    let result = track_job(source, " ").await;
    assert!(result.is_err());
    assert_eq!(exit_code(result), None);
}

#[tokio::test]
async fn interrupt_fires_while_updates_keep_arriving() {
    let source = Arc::new(Ticking::default());
    let open = Arc::clone(&source.open);

    let interrupt = tokio::time::sleep(Duration::from_millis(100));
    let result = tokio::time::timeout(
        Duration::from_secs(5),
        track_until(source, "job-1", interrupt),
    )
    .await
    .expect("interrupt was never observed");

    assert_eq!(exit_code(result), Some(EXIT_INTERRUPTED));
    assert_eq!(open.load(Ordering::SeqCst), 0);
}
