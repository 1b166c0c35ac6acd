//! The five phases of schematic analysis.
//!
//! The vision and OCR models run outside this crate; these stages only carry
//! the contract and report empty detections until a backend is attached.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use super::stage::{Stage, StageContext, StageOutcome, StageOutput};
use super::stage_set::{StageDescriptor, StageSet};

pub const RASTERIZE: &str = "rasterize";
pub const DETECT_COMPONENTS: &str = "detect_components";
pub const DETECT_LINES: &str = "detect_lines";
pub const RECOGNIZE_TEXT: &str = "recognize_text";
pub const POST_PROCESS: &str = "post_process";

const SUPPORTED_SCHEMES: &[&str] = &["http://", "https://", "s3://", "file://"];

/// PDF to page images.
pub struct RasterizeStage {
    pub dpi: u32,
}

impl Default for RasterizeStage {
    fn default() -> Self {
        Self { dpi: 300 }
    }
}

#[async_trait]
impl Stage for RasterizeStage {
    async fn execute(&self, ctx: &StageContext) -> StageOutcome {
        if !SUPPORTED_SCHEMES
            .iter()
            .any(|scheme| ctx.source_ref.starts_with(scheme))
        {
            return StageOutcome::failure(format!(
                "unsupported source reference '{}'",
                ctx.source_ref
            ));
        }

        let mut out = StageOutput::new();
        out.insert("pages_processed".to_string(), json!(0));
        out.insert("dpi".to_string(), json!(self.dpi));
        StageOutcome::success(out)
    }
}

/// Component detection on page images.
pub struct DetectComponentsStage;

#[async_trait]
impl Stage for DetectComponentsStage {
    async fn execute(&self, _ctx: &StageContext) -> StageOutcome {
        let mut out = StageOutput::new();
        out.insert("components".to_string(), json!([]));
        out.insert("components_detected".to_string(), json!(0));
        StageOutcome::success(out)
    }
}

/// Wire and connection extraction.
pub struct DetectLinesStage;

#[async_trait]
impl Stage for DetectLinesStage {
    async fn execute(&self, _ctx: &StageContext) -> StageOutcome {
        let mut out = StageOutput::new();
        out.insert("wires".to_string(), json!([]));
        StageOutcome::success(out)
    }
}

/// Text recognition on page images or regions.
pub struct RecognizeTextStage;

#[async_trait]
impl Stage for RecognizeTextStage {
    async fn execute(&self, _ctx: &StageContext) -> StageOutcome {
        let mut out = StageOutput::new();
        out.insert("text_blocks".to_string(), json!([]));
        out.insert("text_blocks_extracted".to_string(), json!(0));
        StageOutcome::success(out)
    }
}

/// Associates labels with components and builds the connectivity graph.
pub struct PostProcessStage;

#[async_trait]
impl Stage for PostProcessStage {
    async fn execute(&self, ctx: &StageContext) -> StageOutcome {
        let wires = ctx
            .outputs
            .get("wires")
            .and_then(|w| w.as_array())
            .map(|w| w.len())
            .unwrap_or(0);

        let mut out = StageOutput::new();
        out.insert("connections_found".to_string(), json!(wires));
        out.insert("graph".to_string(), json!({ "nodes": [], "edges": [] }));
        StageOutcome::success(out)
    }
}

/// The analysis pipeline with its standard progress targets.
pub fn default_stage_set() -> StageSet {
    let stages = vec![
        StageDescriptor::new(
            RASTERIZE,
            "Rasterizing PDF pages...",
            0.1,
            Arc::new(RasterizeStage::default()),
        ),
        StageDescriptor::new(
            DETECT_COMPONENTS,
            "Detecting components...",
            0.3,
            Arc::new(DetectComponentsStage),
        ),
        StageDescriptor::new(
            DETECT_LINES,
            "Extracting wires/connections...",
            0.5,
            Arc::new(DetectLinesStage),
        ),
        StageDescriptor::new(
            RECOGNIZE_TEXT,
            "Recognizing text...",
            0.7,
            Arc::new(RecognizeTextStage),
        ),
        StageDescriptor::new(
            POST_PROCESS,
            "Building connectivity graph...",
            1.0,
            Arc::new(PostProcessStage),
        ),
    ];

    match StageSet::new(stages) {
        Ok(set) => set,
        Err(e) => unreachable!("built-in stage set is invalid: {}", e),
    }
}
