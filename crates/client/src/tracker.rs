//! Live job status tracking.
//!
//! [`JobStatusTracker`] owns at most one status subscription at a time.
//! Binding a job opens a subscription through the injected
//! [`StatusSource`] and runs it on its own task: every parsed message
//! updates the observable [`TrackerSnapshot`], a `completed` or `failed`
//! status fires the matching callback once and closes the subscription,
//! and a connection failure surfaces as [`CONNECTION_LOST`].
//!
//! Cancellation (`unbind`, re-`bind`, drop) closes a per-session gate
//! under the same lock the session task holds while applying an effect.
//! Once `unbind` returns, nothing from the old session can reach the
//! snapshot or the callbacks, even if a message was already in flight.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use futures::StreamExt;
use jobstream_core::job_events::is_status_kind;
use jobstream_core::{parse_status_message, JobId, JobStatus, JobStatusEvent, ParseError, Timestamp};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::source::{StatusSource, TransportError};
use crate::sse::SseEvent;

/// Observable error text when the status stream is lost.
pub const CONNECTION_LOST: &str = "connection lost";

/// Lifecycle of the tracker's current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No job bound.
    Idle,
    /// Subscription requested, no status received yet.
    Connecting,
    /// At least one non-terminal status received.
    Active,
    /// A `completed` or `failed` status was received; subscription closed.
    Terminal,
    /// The connection failed; subscription closed.
    Errored,
}

impl SessionState {
    /// Whether the session's subscription has been released.
    pub fn is_closed(self) -> bool {
        matches!(self, SessionState::Terminal | SessionState::Errored)
    }
}

/// What observers see of the tracker.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerSnapshot {
    pub job_id: Option<JobId>,
    /// Fresh per bind; correlates log lines of one subscription.
    pub session_id: Option<Uuid>,
    pub state: SessionState,
    /// Most recent status received, `None` until the first one.
    pub status: Option<JobStatusEvent>,
    /// Set when the connection was lost before a terminal status.
    pub transport_error: Option<String>,
    /// Malformed messages skipped during this session.
    pub discarded: u64,
    pub updated_at: Timestamp,
}

impl TrackerSnapshot {
    fn idle() -> Self {
        Self {
            job_id: None,
            session_id: None,
            state: SessionState::Idle,
            status: None,
            transport_error: None,
            discarded: 0,
            updated_at: Utc::now(),
        }
    }

    fn connecting(job_id: JobId, session_id: Uuid) -> Self {
        Self {
            job_id: Some(job_id),
            session_id: Some(session_id),
            state: SessionState::Connecting,
            ..Self::idle()
        }
    }
}

type CompleteFn = dyn Fn(Option<serde_json::Value>) + Send + Sync;
type ErrorFn = dyn Fn(String) + Send + Sync;

/// Terminal callbacks. Each fires at most once per bound job.
///
/// Callbacks run on the session task while the session is locked, so they
/// must not call back into the tracker that invoked them.
#[derive(Clone, Default)]
pub struct TrackerCallbacks {
    on_complete: Option<Arc<CompleteFn>>,
    on_error: Option<Arc<ErrorFn>>,
}

impl TrackerCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called with the job's `result` when it completes.
    pub fn on_complete(
        mut self,
        f: impl Fn(Option<serde_json::Value>) + Send + Sync + 'static,
    ) -> Self {
        self.on_complete = Some(Arc::new(f));
        self
    }

    /// Called with the job's error text when it fails. Not called for
    /// connection failures.
    pub fn on_error(mut self, f: impl Fn(String) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for TrackerCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackerCallbacks")
            .field("on_complete", &self.on_complete.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// Tracks the live status of one job at a time.
pub struct JobStatusTracker {
    source: Arc<dyn StatusSource>,
    callbacks: TrackerCallbacks,
    snapshot: Arc<watch::Sender<TrackerSnapshot>>,
    session: Option<TrackerSession>,
}

impl JobStatusTracker {
    pub fn new(source: Arc<dyn StatusSource>) -> Self {
        Self::with_callbacks(source, TrackerCallbacks::default())
    }

    pub fn with_callbacks(source: Arc<dyn StatusSource>, callbacks: TrackerCallbacks) -> Self {
        let (snapshot, _) = watch::channel(TrackerSnapshot::idle());
        Self {
            source,
            callbacks,
            snapshot: Arc::new(snapshot),
            session: None,
        }
    }

    /// Subscribe to snapshot changes. Any number of observers may watch.
    pub fn watch(&self) -> watch::Receiver<TrackerSnapshot> {
        self.snapshot.subscribe()
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> TrackerSnapshot {
        self.snapshot.borrow().clone()
    }

    /// The job the tracker is bound to, if any.
    pub fn job_id(&self) -> Option<&JobId> {
        self.session.as_ref().map(|s| &s.job_id)
    }

    /// Start tracking `job_id`.
    ///
    /// Any previous subscription is closed first; the new one is only
    /// opened once the old session task has finished. Binding the same id
    /// again is how callers retry after a connection failure. An empty id
    /// releases any current subscription, leaves the tracker `Idle` and
    /// returns `false`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn bind(&mut self, job_id: &str) -> bool {
        let Some(job_id) = JobId::new(job_id) else {
            tracing::debug!("Bind with empty job id, no job to track");
            self.unbind();
            return false;
        };

        let previous = self.session.take().map(TrackerSession::unsubscribe);
        let session_id = Uuid::new_v4();

        self.snapshot
            .send_replace(TrackerSnapshot::connecting(job_id.clone(), session_id));

        let session = TrackerSession::open(
            SessionContext {
                job_id: job_id.clone(),
                session_id,
                gate: Arc::new(SessionGate::new()),
                cancel: CancellationToken::new(),
                snapshot: Arc::clone(&self.snapshot),
                callbacks: self.callbacks.clone(),
                source: Arc::clone(&self.source),
            },
            previous,
        );

        tracing::info!(job_id = %job_id, session_id = %session_id, "Tracking job status");
        self.session = Some(session);
        true
    }

    /// Stop tracking. No-op when nothing is bound.
    pub fn unbind(&mut self) {
        // The session task winds down on its own once cancelled.
        drop(self.release());
    }

    /// Stop tracking and wait until the subscription is fully released.
    pub async fn shutdown(&mut self) {
        if let Some(task) = self.release() {
            if let Err(e) = task.await {
                if e.is_panic() {
                    tracing::error!(error = %e, "Job status session task panicked");
                }
            }
        }
    }

    fn release(&mut self) -> Option<JoinHandle<()>> {
        let session = self.session.take()?;
        let job_id = session.job_id.clone();
        let task = session.unsubscribe();

        self.snapshot.send_replace(TrackerSnapshot::idle());
        tracing::info!(job_id = %job_id, "Stopped tracking job status");
        Some(task)
    }
}

impl Drop for JobStatusTracker {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            drop(session.unsubscribe());
        }
    }
}

impl fmt::Debug for JobStatusTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobStatusTracker")
            .field("job_id", &self.job_id())
            .field("callbacks", &self.callbacks)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One open subscription. [`unsubscribe`](Self::unsubscribe) is the only
/// way to end it early.
struct TrackerSession {
    job_id: JobId,
    gate: Arc<SessionGate>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl TrackerSession {
    fn open(ctx: SessionContext, previous: Option<JoinHandle<()>>) -> Self {
        let job_id = ctx.job_id.clone();
        let gate = Arc::clone(&ctx.gate);
        let cancel = ctx.cancel.clone();
        let task = tokio::spawn(run_session(ctx, previous));
        Self {
            job_id,
            gate,
            cancel,
            task,
        }
    }

    /// Close the gate, cancel the task and hand back its handle.
    fn unsubscribe(self) -> JoinHandle<()> {
        self.gate.close();
        self.cancel.cancel();
        self.task
    }
}

/// Open/closed flag of one session, checked before applying any effect.
struct SessionGate {
    open: Mutex<bool>,
}

impl SessionGate {
    fn new() -> Self {
        Self {
            open: Mutex::new(true),
        }
    }

    /// Run `f` only if the session is still open. `f` may close it.
    fn with_open<R>(&self, f: impl FnOnce(&mut bool) -> R) -> Option<R> {
        let mut open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        if !*open {
            return None;
        }
        Some(f(&mut open))
    }

    fn close(&self) {
        *self.open.lock().unwrap_or_else(PoisonError::into_inner) = false;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

enum Outcome {
    Completed(Option<serde_json::Value>),
    Failed(String),
}

struct SessionContext {
    job_id: JobId,
    session_id: Uuid,
    gate: Arc<SessionGate>,
    cancel: CancellationToken,
    snapshot: Arc<watch::Sender<TrackerSnapshot>>,
    callbacks: TrackerCallbacks,
    source: Arc<dyn StatusSource>,
}

/// Session task: wait for the previous session, subscribe, consume.
///
/// The stream is dropped (and the connection closed) when this returns.
async fn run_session(ctx: SessionContext, previous: Option<JoinHandle<()>>) {
    if let Some(previous) = previous {
        if let Err(e) = previous.await {
            if e.is_panic() {
                tracing::error!(error = %e, "Previous job status session panicked");
            }
        }
    }

    let opened = tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => return,
        opened = ctx.source.open(&ctx.job_id) => opened,
    };

    let mut stream = match opened {
        Ok(stream) => stream,
        Err(e) => {
            ctx.transport_failed(&e);
            return;
        }
    };

    tracing::debug!(
        job_id = %ctx.job_id,
        session_id = %ctx.session_id,
        "Job status subscription open",
    );

    loop {
        let next = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => {
                tracing::debug!(job_id = %ctx.job_id, "Job status subscription cancelled");
                break;
            }
            next = stream.next() => next,
        };

        let flow = match next {
            Some(Ok(event)) => ctx.handle_event(&event),
            Some(Err(e)) => {
                ctx.transport_failed(&e);
                Flow::Close
            }
            None => {
                ctx.transport_failed(&TransportError::Closed);
                Flow::Close
            }
        };

        if flow == Flow::Close {
            break;
        }
    }
}

impl SessionContext {
    fn handle_event(&self, event: &SseEvent) -> Flow {
        if !is_status_kind(&event.event) {
            tracing::trace!(
                job_id = %self.job_id,
                kind = %event.event,
                "Ignoring non-status event",
            );
            return Flow::Continue;
        }

        match parse_status_message(&event.data) {
            Ok(status) => self.apply_status(status),
            Err(e) => self.discard(&e, &event.data),
        }
    }

    /// Last write wins. A terminal status closes the session and fires
    /// its callback before the gate is released.
    fn apply_status(&self, status: JobStatusEvent) -> Flow {
        let outcome = match status.status {
            JobStatus::Completed => Some(Outcome::Completed(status.result.clone())),
            JobStatus::Failed => Some(Outcome::Failed(status.failure_message().to_string())),
            _ => None,
        };

        self.gate
            .with_open(|open| {
                self.snapshot.send_modify(|snap| {
                    if let Some(previous) = &snap.status {
                        if status.status.rank() < previous.status.rank() {
                            tracing::debug!(
                                job_id = %self.job_id,
                                from = %previous.status,
                                to = %status.status,
                                "Job status moved backwards, applying latest",
                            );
                        }
                    }
                    snap.state = if outcome.is_some() {
                        SessionState::Terminal
                    } else {
                        SessionState::Active
                    };
                    snap.status = Some(status);
                    snap.updated_at = Utc::now();
                });

                let Some(outcome) = outcome else {
                    return Flow::Continue;
                };
                *open = false;
                self.fire(outcome);
                Flow::Close
            })
            .unwrap_or(Flow::Close)
    }

    fn fire(&self, outcome: Outcome) {
        match outcome {
            Outcome::Completed(result) => {
                tracing::info!(job_id = %self.job_id, "Job completed");
                if let Some(on_complete) = &self.callbacks.on_complete {
                    on_complete(result);
                }
            }
            Outcome::Failed(message) => {
                tracing::warn!(job_id = %self.job_id, error = %message, "Job failed");
                if let Some(on_error) = &self.callbacks.on_error {
                    on_error(message);
                }
            }
        }
    }

    fn discard(&self, error: &ParseError, raw: &str) -> Flow {
        tracing::warn!(
            job_id = %self.job_id,
            session_id = %self.session_id,
            error = %error,
            raw_message = %raw,
            "Failed to parse job status message",
        );

        self.gate
            .with_open(|_| {
                self.snapshot.send_modify(|snap| snap.discarded += 1);
                Flow::Continue
            })
            .unwrap_or(Flow::Close)
    }

    fn transport_failed(&self, error: &TransportError) {
        let applied = self.gate.with_open(|open| {
            *open = false;
            self.snapshot.send_modify(|snap| {
                snap.state = SessionState::Errored;
                snap.transport_error = Some(CONNECTION_LOST.to_string());
                snap.updated_at = Utc::now();
            });
        });

        if applied.is_some() {
            tracing::error!(
                job_id = %self.job_id,
                session_id = %self.session_id,
                error = %error,
                "Job status stream lost",
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_runs_until_closed() {
        let gate = SessionGate::new();
        assert_eq!(gate.with_open(|_| 1), Some(1));

        gate.close();
        assert_eq!(gate.with_open(|_| 2), None);
    }

    #[test]
    fn gate_can_be_closed_from_inside() {
        let gate = SessionGate::new();
        gate.with_open(|open| *open = false);
        assert!(gate.with_open(|_| ()).is_none());
    }

    #[test]
    fn idle_snapshot_is_empty() {
        let snap = TrackerSnapshot::idle();
        assert_eq!(snap.state, SessionState::Idle);
        assert!(snap.job_id.is_none());
        assert!(snap.status.is_none());
        assert!(snap.transport_error.is_none());
        assert_eq!(snap.discarded, 0);
    }

    #[test]
    fn closed_states() {
        assert!(!SessionState::Idle.is_closed());
        assert!(!SessionState::Connecting.is_closed());
        assert!(!SessionState::Active.is_closed());
        assert!(SessionState::Terminal.is_closed());
        assert!(SessionState::Errored.is_closed());
    }

    #[test]
    fn callbacks_debug_shows_presence_only() {
        let callbacks = TrackerCallbacks::new().on_error(|_| {});
        let printed = format!("{callbacks:?}");
        assert!(printed.contains("on_complete: false"));
        assert!(printed.contains("on_error: true"));
    }
}
