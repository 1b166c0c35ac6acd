//! Server-sent stream of job transitions.

use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::stream::{self, Stream};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::Receiver;
use tokio_util::sync::CancellationToken;

use schemalyze::JobEvent;

use crate::state::AppState;

pub const EVENT_NAME: &str = "job";

pub async fn events(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let rx = state.events.subscribe();
    Sse::new(job_event_stream(rx, state.shutdown.clone()))
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

fn job_event_stream(
    rx: Receiver<JobEvent>,
    shutdown: CancellationToken,
) -> impl Stream<Item = Result<Event, axum::Error>> {
    stream::unfold((rx, shutdown), |(mut rx, shutdown)| async move {
        loop {
            let received = tokio::select! {
                _ = shutdown.cancelled() => return None,
                received = rx.recv() => received,
            };

            match received {
                Ok(event) => {
                    let sse = Event::default().event(EVENT_NAME).json_data(&event);
                    return Some((sse, (rx, shutdown)));
                }
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!("Event stream lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
}
