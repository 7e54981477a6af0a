use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderMap, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::AppError;
use crate::export::pagination::estimate_from_measurement;
use crate::export::{
    BufferedDelivery, CancellationFlag, ExportOptions, ExportOrchestrator, FitPolicy,
    InMemoryRenderSource, PageEstimate, PageGeometry, PaperFormat, RasterSurface,
    SlicingStrategy,
};
use crate::state::AppState;

/// Container id the uploaded document is mounted under.
const ROOT_ID: &str = "resume-preview";
const PAGE_COUNT_HEADER: HeaderName = HeaderName::from_static("x-page-count");
const EXPORT_ID_HEADER: HeaderName = HeaderName::from_static("x-export-id");

// ────────────────────────────────────────────────────────────────────────────
// POST /api/v1/pagination/estimate
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EstimateRequest {
    /// Measured height of the rendered document; absent while it is not laid out.
    pub total_height_px: Option<u32>,
    pub format: Option<PaperFormat>,
    pub margin_mm: Option<f64>,
    pub pixels_per_page: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct EstimateResponse {
    pub page_count: PageEstimate,
    pub pixels_per_page: u32,
}

/// POST /api/v1/pagination/estimate
pub async fn handle_estimate(
    State(state): State<AppState>,
    Json(req): Json<EstimateRequest>,
) -> Result<Json<EstimateResponse>, AppError> {
    let mut geometry = PageGeometry::new(
        req.format.unwrap_or(state.config.default_format),
        req.margin_mm.unwrap_or(state.config.default_margin_mm),
    )?;
    if let Some(pixels_per_page) = req.pixels_per_page {
        geometry = geometry.with_pixels_per_page(pixels_per_page)?;
    }

    Ok(Json(EstimateResponse {
        page_count: estimate_from_measurement(req.total_height_px, &geometry),
        pixels_per_page: geometry.pixels_per_page,
    }))
}

// ────────────────────────────────────────────────────────────────────────────
// POST /api/v1/export
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ExportQuery {
    pub subject_name: Option<String>,
    pub filename: Option<String>,
    pub quality: Option<f32>,
    pub format: Option<PaperFormat>,
    pub margin_mm: Option<f64>,
    pub pixels_per_page: Option<u32>,
    pub fit: Option<FitPolicy>,
    pub strategy: Option<SlicingStrategy>,
    /// Pixel density the uploaded bitmap was rendered at (2 for a HiDPI screenshot).
    pub device_scale: Option<f32>,
    pub font_family: Option<String>,
}

impl ExportQuery {
    fn into_options(self, state: &AppState) -> ExportOptions {
        let config = &state.config;
        ExportOptions {
            filename: self.filename.map(|name| {
                name.replace(|c: char| matches!(c, '"' | '\\' | '/') || c.is_control(), "")
            }),
            subject_name: self.subject_name,
            quality: self.quality.unwrap_or(config.default_quality),
            format: self.format.unwrap_or(config.default_format),
            margin_mm: self.margin_mm.unwrap_or(config.default_margin_mm),
            pixels_per_page: self.pixels_per_page,
            fit: self.fit.unwrap_or(config.fit_policy),
            strategy: self.strategy.unwrap_or(config.slicing_strategy),
            font_family: self.font_family,
            ..ExportOptions::default()
        }
    }
}

/// POST /api/v1/export
///
/// Body: the rendered document as one PNG or JPEG bitmap. Responds with the PDF.
pub async fn handle_export(
    State(state): State<AppState>,
    Query(query): Query<ExportQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    if let Some(content_type) = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
    {
        if !content_type.starts_with("image/") {
            return Err(AppError::UnsupportedMediaType(format!(
                "expected image/png or image/jpeg, got {content_type}"
            )));
        }
    }
    if body.is_empty() {
        return Err(AppError::Validation("request body is empty".to_string()));
    }

    let device_scale = query.device_scale.unwrap_or(1.0);
    if !device_scale.is_finite() || device_scale <= 0.0 {
        return Err(AppError::Validation(format!(
            "device_scale must be positive, got {device_scale}"
        )));
    }
    let options = query.into_options(&state);
    let geometry = options.validate()?;

    // Decoding is CPU-bound.
    let bitmap = tokio::task::spawn_blocking(move || image::load_from_memory(&body))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("decode task failed: {e}")))?
        .map_err(|e| AppError::Validation(format!("body is not a readable PNG or JPEG image: {e}")))?
        .into_rgba8();
    info!(
        "Export request: {}×{}px bitmap at device scale {device_scale}",
        bitmap.width(),
        bitmap.height()
    );

    let source = InMemoryRenderSource::new();
    source.mount_paged(
        ROOT_ID,
        RasterSurface::new(bitmap).with_device_scale(device_scale),
        &geometry,
    );

    let orchestrator = ExportOrchestrator::new(
        Arc::new(source),
        state.fonts.clone(),
        state.notifier.clone(),
        Arc::new(BufferedDelivery::new()),
    )
    .with_limits(state.config.export_limits());
    let report = orchestrator
        .export(ROOT_ID, &options, &CancellationFlag::new())
        .await?;

    info!(
        "Export {} done with {} slicing in {}ms",
        report.run_id,
        report.strategy,
        report.elapsed.as_millis()
    );
    let document = report.document;
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", document.filename),
            ),
            (PAGE_COUNT_HEADER, document.page_count.to_string()),
            (EXPORT_ID_HEADER, report.run_id.to_string()),
        ],
        document.bytes,
    )
        .into_response())
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
