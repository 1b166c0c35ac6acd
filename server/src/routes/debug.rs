//! Single-stage endpoints for exercising one model outside a job.
//!
//! These run a stage from the scheduler's stage set directly. No job record
//! is created and nothing is broadcast.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use schemalyze::pipeline::execute_contained;
use schemalyze::pipeline::phases::{DETECT_COMPONENTS, RECOGNIZE_TEXT};
use schemalyze::{StageContext, StageOutcome, StageOutput};

use super::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectRequest {
    #[serde(alias = "image_url")]
    pub image_url: String,
    #[serde(alias = "page_id")]
    pub page_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectResponse {
    pub page_id: String,
    pub components: Value,
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrRequest {
    #[serde(alias = "image_url")]
    pub image_url: String,
    /// `{x, y, width, height}` in page pixels.
    #[serde(default)]
    pub region: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrResponse {
    pub text_blocks: Value,
    pub message: String,
}

pub async fn detect(
    State(state): State<AppState>,
    body: Result<Json<DetectRequest>, JsonRejection>,
) -> ApiResult<Json<DetectResponse>> {
    let Json(request) = body?;

    let mut ctx = StageContext::standalone(&request.image_url);
    ctx.outputs
        .insert("page_id".to_string(), Value::String(request.page_id.clone()));

    let output = run_stage(&state, DETECT_COMPONENTS, &ctx).await?;
    let components = output
        .get("components")
        .cloned()
        .unwrap_or_else(|| Value::Array(Vec::new()));
    let count = components.as_array().map(|c| c.len()).unwrap_or(0);

    Ok(Json(DetectResponse {
        page_id: request.page_id,
        components,
        message: format!("Detected {} components", count),
    }))
}

pub async fn ocr(
    State(state): State<AppState>,
    body: Result<Json<OcrRequest>, JsonRejection>,
) -> ApiResult<Json<OcrResponse>> {
    let Json(request) = body?;

    let mut ctx = StageContext::standalone(&request.image_url);
    if let Some(region) = request.region {
        ctx.outputs.insert("region".to_string(), region);
    }

    let output = run_stage(&state, RECOGNIZE_TEXT, &ctx).await?;
    let text_blocks = output
        .get("text_blocks")
        .cloned()
        .unwrap_or_else(|| Value::Array(Vec::new()));
    let count = text_blocks.as_array().map(|b| b.len()).unwrap_or(0);

    Ok(Json(OcrResponse {
        text_blocks,
        message: format!("Recognized {} text blocks", count),
    }))
}

async fn run_stage(state: &AppState, name: &str, ctx: &StageContext) -> ApiResult<StageOutput> {
    let descriptor = state.scheduler.stages().get(name).ok_or_else(|| {
        ApiError::new(
            StatusCode::NOT_IMPLEMENTED,
            format!("Stage '{}' is not configured", name),
        )
    })?;

    match execute_contained(descriptor.stage.as_ref(), ctx).await {
        StageOutcome::Success { partial_result } => Ok(partial_result),
        StageOutcome::Failure { error } => {
            log::warn!("Standalone {} failed: {}", name, error);
            Err(ApiError::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                format!("{} failed: {}", name, error),
            ))
        }
    }
}
