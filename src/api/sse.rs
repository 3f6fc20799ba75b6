//! SSE Streaming Adapter
//!
//! Bridges a session's broadcast event bus onto an ordered Server-Sent
//! Events stream. Dropping the stream (client disconnect) only drops the
//! subscription; the underlying run continues to the thread store and the
//! client may reconnect and fetch the final report.

use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::stream::Stream;
use std::convert::Infallible;
use tokio::sync::broadcast;
use tracing::debug;

use crate::services::workflow::WorkflowEvent;

/// Wrap an event subscription as an SSE response. Events are delivered in
/// the order the state machine emitted them; a lagging consumer skips
/// ahead rather than stalling the session.
pub fn event_stream(
    receiver: broadcast::Receiver<WorkflowEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = futures_util::stream::unfold(receiver, |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    let sse_event = Event::default()
                        .event(event.sse_name())
                        .data(event.sse_payload().to_string());
                    return Some((Ok(sse_event), receiver));
                }
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "sse consumer lagged, skipping ahead");
                    continue;
                }
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
