//! Job-progress SSE stream (supplemented: §4.9's observability contract asks
//! for progress visibility; polling the job row is the simplest way to
//! expose that over HTTP without wiring a separate pub/sub channel through
//! the job worker).

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::stream::{self, Stream};
use uuid::Uuid;

use crate::state::SharedState;

const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// `GET /v1/jobs/{id}/events` — streams one snapshot per poll until the job
/// reaches a terminal status, then closes.
pub async fn job_events(State(state): State<SharedState>, Path(id): Path<Uuid>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let jobs = state.jobs.clone();

    let stream = stream::unfold(Some(id), move |cursor| {
        let jobs = jobs.clone();
        async move {
            let id = cursor?;
            tokio::time::sleep(POLL_INTERVAL).await;

            match jobs.get(id).await {
                Ok(Some(job)) => {
                    let done = job.status.is_terminal();
                    let payload = serde_json::json!({
                        "job_id": job.id,
                        "status": job.status.as_str(),
                        "progress_percent": job.progress_percent,
                        "progress_message": job.progress_message,
                    });
                    let event = Event::default().json_data(payload).unwrap_or_else(|_| Event::default().data("{}"));
                    Some((Ok(event), if done { None } else { Some(id) }))
                }
                Ok(None) => Some((Ok(Event::default().event("not_found").data(id.to_string())), None)),
                Err(_) => Some((Ok(Event::default().event("error").data("job lookup failed")), None)),
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default().interval(Duration::from_secs(15)))
}
