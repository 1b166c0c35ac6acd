//! Job submission, polling and cancellation.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use schemalyze::{JobStatusView, SubmitRequest};

use super::{ApiError, ApiResult};
use crate::state::AppState;

/// Body of `POST /process`.
///
/// Field names are camelCase; the snake_case and `fileUrl` spellings used by
/// older clients are accepted too.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRequest {
    #[serde(default, alias = "schematic_id")]
    pub schematic_id: Option<String>,

    #[serde(default, alias = "fileUrl", alias = "file_url", alias = "source_ref")]
    pub source_ref: Option<String>,

    #[serde(default, alias = "callbackUrl", alias = "callback_url", alias = "callback_ref")]
    pub callback_ref: Option<String>,
}

impl From<ProcessRequest> for SubmitRequest {
    fn from(body: ProcessRequest) -> Self {
        let request = SubmitRequest::new(
            body.schematic_id.unwrap_or_default(),
            body.source_ref.unwrap_or_default(),
        );
        match body.callback_ref.filter(|c| !c.trim().is_empty()) {
            Some(callback) => request.with_callback(callback),
            None => request,
        }
    }
}

/// Queues a job and returns its QUEUED snapshot without waiting for it.
pub async fn process(
    State(state): State<AppState>,
    body: Result<Json<ProcessRequest>, JsonRejection>,
) -> ApiResult<Json<JobStatusView>> {
    let Json(body) = body?;
    let record = state.scheduler.submit(body.into())?;
    Ok(Json(record.view()))
}

pub async fn status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobStatusView>> {
    let record = state.scheduler.get(&job_id)?;
    Ok(Json(record.view()))
}

/// Requests cancellation. The job stops at its next stage boundary.
pub async fn cancel(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<(StatusCode, Json<JobStatusView>)> {
    let record = state.scheduler.cancel(&job_id).map_err(ApiError::from)?;
    Ok((StatusCode::ACCEPTED, Json(record.view())))
}
