//! Server-Sent Events encoding of the event bus.
//!
//! Each connection owns one bus subscriber and turns it into a byte stream:
//! one `event:`/`data:` frame per event, in publish order, interleaved with a
//! comment frame whenever the connection has been idle for the keep-alive
//! interval. Dropping the stream drops the subscriber.

use crate::events::{EventSubscriber, ServerEvent};
use actix_web::web::Bytes;
use futures::Stream;
use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};

/// Comment frame written on idle connections
pub const KEEP_ALIVE_FRAME: &[u8] = b": keep-alive\n\n";

/// Format one event for the wire.
///
/// Returns `None` if the payload cannot be serialized; the event is then
/// skipped for this connection.
pub fn format_sse_message(event: &ServerEvent) -> Option<Bytes> {
    match event.to_json() {
        Ok(data) => Some(Bytes::from(format!(
            "event: {}\ndata: {}\n\n",
            event.event_type(),
            data
        ))),
        Err(e) => {
            tracing::error!(
                error = %e,
                event_type = event.event_type(),
                server_id = %event.server_id,
                "Failed to serialize event"
            );
            None
        }
    }
}

/// Turn a subscriber into an SSE body stream
pub fn event_stream(
    mut subscriber: EventSubscriber,
    keep_alive: Duration,
) -> impl Stream<Item = Result<Bytes, actix_web::Error>> {
    async_stream::stream! {
        let keep_alive = keep_alive.max(Duration::from_millis(100));
        let mut ticker = time::interval_at(Instant::now() + keep_alive, keep_alive);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let frame = tokio::select! {
                event = subscriber.recv() => match event {
                    Some(event) => {
                        ticker.reset();
                        format_sse_message(&event)
                    }
                    None => break,
                },
                _ = ticker.tick() => Some(Bytes::from_static(KEEP_ALIVE_FRAME)),
            };

            if let Some(frame) = frame {
                yield Ok::<_, actix_web::Error>(frame);
            }
        }

        tracing::debug!("Event bus closed, ending event stream");
    }
}
