//! Server-Sent Events stream
//!
//! Bridges the internal event bus onto `/events`. Every [`BelfryEvent`] is
//! sent as a named SSE event carrying its JSON form; slow clients that fall
//! behind the broadcast buffer simply miss events.

use crate::api::server::AppContext;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::debug;

/// GET /events
pub async fn event_stream(
    State(ctx): State<AppContext>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = ctx.app.events.subscribe();
    debug!(
        "SSE client connected ({} subscriber(s))",
        ctx.app.events.subscriber_count()
    );

    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(event) => {
            let name = event.event_type();
            match serde_json::to_string(&event) {
                Ok(json) => Some(Ok(Event::default().event(name).data(json))),
                Err(e) => {
                    debug!("failed to serialize event: {}", e);
                    None
                }
            }
        }
        // lagged receiver: drop the error, keep streaming
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
