//! Server-sent event stream of forwarded events.

use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{Router, routing::get};
use futures::Stream;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use crate::error::ApiError;
use crate::state::AppState;

/// GET /events
///
/// Streams every event the channel sink forwards while the client is
/// connected. Only available when the channel sink is active.
async fn stream_events(
    State(state): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let receiver = state
        .channel
        .as_ref()
        .ok_or(ApiError::ChannelDisabled)?
        .subscribe();

    let stream = futures::stream::unfold(receiver, |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    let data = match serde_json::to_string(&*event) {
                        Ok(data) => data,
                        Err(e) => {
                            warn!(error = %e, "failed to encode event for stream");
                            continue;
                        }
                    };
                    let frame = Event::default()
                        .id(event.event_id.to_string())
                        .event(event.event_type.as_str())
                        .data(data);
                    return Some((Ok(frame), receiver));
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event stream subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Returns the event stream router.
pub fn router() -> Router<AppState> {
    Router::new().route("/events", get(stream_events))
}
