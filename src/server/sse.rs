use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::header::{HeaderName, CACHE_CONTROL};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures_util::stream;

use super::routes::find_job;
use super::AppState;
use crate::daemon::tracker::{Job, STREAM_TAIL};
use crate::models::JobSnapshot;

/// Guard that logs at debug level when the SSE stream is dropped (client disconnects).
struct SseDropGuard;

impl Drop for SseDropGuard {
    fn drop(&mut self) {
        tracing::debug!("SSE client disconnected");
    }
}

enum StreamState {
    /// Job id unknown: emit one error snapshot, then end.
    Unknown,
    Polling {
        job: Arc<Job>,
        last_sent: Option<String>,
        poll: Duration,
        wait: bool,
        _guard: SseDropGuard,
    },
    Finished,
}

/// Advance the stream by at most one event. Snapshots are only emitted when
/// they differ from the previous one; the stream ends after a terminal one.
async fn next_event(state: StreamState) -> Option<(Result<Event, Infallible>, StreamState)> {
    match state {
        StreamState::Finished => None,
        StreamState::Unknown => {
            let data = serde_json::to_string(&JobSnapshot::unknown()).ok()?;
            Some((Ok(Event::default().data(data)), StreamState::Finished))
        }
        StreamState::Polling {
            job,
            last_sent,
            poll,
            mut wait,
            _guard,
        } => loop {
            if wait {
                tokio::time::sleep(poll).await;
            }
            wait = true;

            let snapshot = job.snapshot(Some(STREAM_TAIL)).await;
            let terminal = snapshot.status.is_terminal();
            let data = match serde_json::to_string(&snapshot) {
                Ok(data) => data,
                Err(e) => {
                    tracing::warn!("Failed to encode snapshot for job {}: {}", job.id(), e);
                    return None;
                }
            };

            if last_sent.as_deref() != Some(data.as_str()) {
                let event = Event::default().data(data.clone());
                let next = if terminal {
                    StreamState::Finished
                } else {
                    StreamState::Polling {
                        job,
                        last_sent: Some(data),
                        poll,
                        wait: true,
                        _guard,
                    }
                };
                return Some((Ok(event), next));
            }
            if terminal {
                return None;
            }
        },
    }
}

/// GET /progress/{job_id}/stream
pub async fn progress_stream(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Response {
    let initial = match find_job(&state, &job_id).await {
        Some(job) => {
            tracing::debug!("SSE client connected for job {}", job.id());
            StreamState::Polling {
                job,
                last_sent: None,
                poll: Duration::from_millis(state.config.stream_poll_millis.max(1)),
                wait: false,
                _guard: SseDropGuard,
            }
        }
        None => StreamState::Unknown,
    };

    let sse = Sse::new(stream::unfold(initial, next_event)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keepalive"),
    );

    (
        [
            (CACHE_CONTROL, "no-cache"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        sse,
    )
        .into_response()
}
