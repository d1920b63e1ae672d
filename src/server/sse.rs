//! Server-Sent Events relay for session event buses.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::stream::Stream;
use tokio::sync::broadcast;
use tracing::warn;

use crate::state::AppState;
use crate::utils::error::AppResult;

/// GET /session/{id}/events - stream `backchannel` and `turn_complete`
/// events for one session until it closes.
pub async fn events_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let session = state.sessions.get(&session_id)?;
    let mut rx = session.subscribe();

    let stream = async_stream::stream! {
        yield Ok(Event::default().event("connected").data("{}"));

        loop {
            match rx.recv().await {
                Ok(event) => {
                    let name = event.event_name();
                    match serde_json::to_string(&event) {
                        Ok(json) => yield Ok(Event::default().event(name).data(json)),
                        Err(e) => warn!(error = %e, "failed to serialize session event"),
                    }
                    if name == "session_ended" {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, session_id = %session_id, "SSE client lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    ))
}
