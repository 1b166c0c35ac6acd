//! Shared state handed to every request handler.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use schemalyze::{JobEventBroadcaster, Scheduler};

#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<Scheduler>,

    /// Source of the `/events` stream.
    pub events: JobEventBroadcaster,

    /// Cancelled when the server begins shutting down. Ends open event streams.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(scheduler: Arc<Scheduler>, events: JobEventBroadcaster) -> Self {
        Self {
            scheduler,
            events,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }
}
