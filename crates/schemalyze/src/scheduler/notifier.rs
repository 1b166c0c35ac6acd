//! Completion callbacks.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::NotifyError;
use crate::job::JobRecord;

/// Told about every job that reached a terminal status.
#[async_trait]
pub trait CompletionNotifier: Send + Sync {
    async fn notify(&self, record: &JobRecord) -> Result<(), NotifyError>;
}

/// Notifier that does nothing.
pub struct NoopNotifier;

#[async_trait]
impl CompletionNotifier for NoopNotifier {
    async fn notify(&self, _record: &JobRecord) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// POSTs the job's status projection to its `callback_ref`, if it has one.
pub struct HttpCallbackNotifier {
    client: reqwest::Client,
}

impl HttpCallbackNotifier {
    pub fn new(timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("schemalyze/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(NotifyError::Client)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl CompletionNotifier for HttpCallbackNotifier {
    async fn notify(&self, record: &JobRecord) -> Result<(), NotifyError> {
        let Some(url) = record.callback_ref.as_deref() else {
            return Ok(());
        };

        let response = self
            .client
            .post(url)
            .json(&record.view())
            .send()
            .await
            .map_err(|source| NotifyError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        log::debug!("Notified {} about job {}", url, record.id);
        Ok(())
    }
}
