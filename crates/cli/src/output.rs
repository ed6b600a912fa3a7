//! Rendering of tracker snapshots for the terminal.

use jobstream_client::{SessionState, TrackerSnapshot};
use jobstream_core::JobStatus;

use crate::exit_error::{ExitError, EXIT_CONNECTION_LOST, EXIT_JOB_FAILED};

/// One status line for a snapshot, or `None` when nothing is bound.
pub fn render_snapshot(snapshot: &TrackerSnapshot) -> Option<String> {
    let job_id = snapshot.job_id.as_ref()?;

    let detail = match (&snapshot.state, &snapshot.status) {
        (SessionState::Idle, _) => return None,
        (SessionState::Errored, _) => snapshot
            .transport_error
            .clone()
            .unwrap_or_else(|| "error".to_string()),
        (SessionState::Connecting, None) => "connecting".to_string(),
        (_, Some(event)) => match event.status {
            JobStatus::Completed => match &event.result {
                Some(result) => format!("completed {result}"),
                None => "completed".to_string(),
            },
            JobStatus::Failed => format!("failed: {}", event.failure_message()),
            status => match event.progress {
                Some(progress) => format!("{status} {progress:.0}%"),
                None => status.to_string(),
            },
        },
        (_, None) => format!("{:?}", snapshot.state).to_lowercase(),
    };

    Some(format!("{job_id}  {detail}"))
}

/// Map a closed session to the command's result.
pub fn exit_status(snapshot: &TrackerSnapshot) -> Result<(), ExitError> {
    match snapshot.state {
        SessionState::Errored => Err(ExitError::new(
            EXIT_CONNECTION_LOST,
            snapshot
                .transport_error
                .clone()
                .unwrap_or_else(|| "error".to_string()),
        )),
        SessionState::Terminal => match &snapshot.status {
            Some(event) if event.status == JobStatus::Failed => Err(ExitError::new(
                EXIT_JOB_FAILED,
                event.failure_message().to_string(),
            )),
            _ => Ok(()),
        },
        _ => Ok(()),
    }
}
