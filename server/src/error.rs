use thiserror::Error;

use schemalyze::{ConfigError, NotifyError, SchemalyzeError};

/// Errors that stop the server from starting or serving.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Schemalyze(#[from] SchemalyzeError),

    #[error("Failed to build callback client: {0}")]
    Notifier(#[from] NotifyError),

    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),
}
