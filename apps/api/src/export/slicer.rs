//! Page Slicer: turns rendered surfaces into one raster image per physical page.
//!
//! # Strategies
//! Two implementations of [`PageSlicer`]; a pipeline uses exactly one of them.
//! - [`BoundedContainerSlicer`] (strategy A): measures the root container, then
//!   captures each `<root>-page-<n>` container independently. Every capture is already
//!   page-sized.
//! - [`BandCropSlicer`] (strategy B): captures the root container once as a single tall
//!   raster and crops fixed-height bands out of it, padding the last band.
//!
//! Both measure the root first and derive the page count with the same estimator the
//! preview uses, so the number of captured pages always equals the preview estimate.
//! Pages are produced sequentially; the cancellation flag is checked once per page and
//! every capture call is bounded by the capture timeout.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use image::imageops;
use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::export::error::ExportError;
use crate::export::geometry::PageGeometry;
use crate::export::pagination::{estimate_pages, PageEstimate};
use crate::export::surface::{page_container_id, CaptureRequest, RenderSource, RenderSurface};

// ────────────────────────────────────────────────────────────────────────────
// Types
// ────────────────────────────────────────────────────────────────────────────

/// One page worth of raster output.
///
/// Owned exclusively by the export run that produced it; the assembler consumes it.
#[derive(Debug, Clone)]
pub struct CapturedPage {
    /// Zero-based page index.
    pub index: u32,
    pub image: RgbaImage,
    /// Raster scale multiplier the page was captured at.
    pub quality: f32,
}

impl CapturedPage {
    pub fn width_px(&self) -> u32 {
        self.image.width()
    }

    pub fn height_px(&self) -> u32 {
        self.image.height()
    }
}

/// Cooperative cancellation flag shared between the caller and a running export.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything a slicer needs for one run.
#[derive(Debug, Clone)]
pub struct SliceContext<'a> {
    pub geometry: &'a PageGeometry,
    pub quality: f32,
    pub background: Rgba<u8>,
    pub capture_timeout: Duration,
    pub max_pages: u32,
    /// Budget for all page rasters of one run together, in pixels.
    pub max_raster_pixels: u64,
    pub cancel: &'a CancellationFlag,
}

impl SliceContext<'_> {
    fn capture_request(&self) -> CaptureRequest {
        CaptureRequest {
            scale: self.quality,
            background: self.background,
        }
    }

    /// Height of one page band in captured (quality-scaled) pixels.
    fn band_height_px(&self) -> u32 {
        ((self.geometry.pixels_per_page as f32) * self.quality)
            .round()
            .max(1.0) as u32
    }

    /// First captured row of page `index`. Rounded from the unscaled offset so bands
    /// stay aligned with the resized raster at fractional quality.
    fn band_top_px(&self, index: u32) -> u32 {
        (f64::from(index) * f64::from(self.geometry.pixels_per_page) * f64::from(self.quality))
            .round() as u32
    }

    fn check_cancelled(&self, completed: u32, total: u32) -> Result<(), ExportError> {
        if self.cancel.is_cancelled() {
            return Err(ExportError::Cancelled { completed, total });
        }
        Ok(())
    }
}

/// Which slicing strategy a pipeline uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SlicingStrategy {
    /// Strategy A: capture each bounded page container.
    BoundedContainers,
    /// Strategy B: capture once, crop bands.
    #[default]
    BandCrop,
}

impl SlicingStrategy {
    pub fn slicer(self) -> Arc<dyn PageSlicer> {
        match self {
            SlicingStrategy::BoundedContainers => Arc::new(BoundedContainerSlicer),
            SlicingStrategy::BandCrop => Arc::new(BandCropSlicer),
        }
    }
}

impl fmt::Display for SlicingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlicingStrategy::BoundedContainers => write!(f, "bounded-containers"),
            SlicingStrategy::BandCrop => write!(f, "band-crop"),
        }
    }
}

impl FromStr for SlicingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bounded-containers" | "bounded" => Ok(SlicingStrategy::BoundedContainers),
            "band-crop" | "band" => Ok(SlicingStrategy::BandCrop),
            other => Err(format!(
                "unknown slicing strategy '{other}' (expected 'band-crop' or 'bounded-containers')"
            )),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Trait
// ────────────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait PageSlicer: Send + Sync {
    fn strategy(&self) -> SlicingStrategy;

    /// Produces one [`CapturedPage`] per page of the document rooted at `root_id`.
    async fn slice(
        &self,
        source: &dyn RenderSource,
        root_id: &str,
        ctx: &SliceContext<'_>,
    ) -> Result<Vec<CapturedPage>, ExportError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Shared helpers
// ────────────────────────────────────────────────────────────────────────────

fn lookup(source: &dyn RenderSource, id: &str) -> Result<Arc<dyn RenderSurface>, ExportError> {
    source
        .lookup(id)
        .ok_or_else(|| ExportError::CaptureTargetMissing(id.to_string()))
}

/// Measures the root container and applies the page-count and raster-size guards.
fn measure_pages(surface: &dyn RenderSurface, ctx: &SliceContext<'_>) -> Result<PageEstimate, ExportError> {
    let size = surface.measure();
    let estimate = match size {
        Some(size) => estimate_pages(size.height_px, ctx.geometry.pixels_per_page)?,
        None => PageEstimate::MIN,
    };
    if estimate.get() > ctx.max_pages {
        return Err(ExportError::PageLimitExceeded {
            pages: estimate.get(),
            limit: ctx.max_pages,
        });
    }

    if let Some(size) = size {
        let width = ((size.width_px as f32) * ctx.quality).round().max(1.0) as u64;
        let pixels = width
            .saturating_mul(u64::from(ctx.band_height_px()))
            .saturating_mul(u64::from(estimate.get()));
        if pixels > ctx.max_raster_pixels {
            return Err(ExportError::RasterTooLarge {
                pixels,
                limit: ctx.max_raster_pixels,
            });
        }
    }
    Ok(estimate)
}

async fn capture_with_timeout(
    surface: &dyn RenderSurface,
    target: &str,
    ctx: &SliceContext<'_>,
) -> Result<RgbaImage, ExportError> {
    let request = ctx.capture_request();
    let image = tokio::time::timeout(ctx.capture_timeout, surface.capture(&request))
        .await
        .map_err(|_| ExportError::CaptureTimeout {
            target: target.to_string(),
            timeout_ms: ctx.capture_timeout.as_millis() as u64,
        })??;

    if image.width() == 0 || image.height() == 0 {
        return Err(ExportError::CaptureFailed {
            target: target.to_string(),
            reason: "capture produced an empty raster".to_string(),
        });
    }
    Ok(image)
}

/// Copies rows `[top, top + band_height)` of `source` onto a background-filled band.
/// Rows past the end of `source` stay background.
fn cut_band(source: &RgbaImage, top: u32, band_height: u32, background: Rgba<u8>) -> RgbaImage {
    let mut band = RgbaImage::from_pixel(source.width(), band_height, background);
    let top = top.min(source.height());
    let rows = band_height.min(source.height() - top);
    if rows > 0 {
        let content = imageops::crop_imm(source, 0, top, source.width(), rows).to_image();
        imageops::overlay(&mut band, &content, 0, 0);
    }
    band
}

// ────────────────────────────────────────────────────────────────────────────
// Strategy A: bounded per-page containers
// ────────────────────────────────────────────────────────────────────────────

pub struct BoundedContainerSlicer;

#[async_trait]
impl PageSlicer for BoundedContainerSlicer {
    fn strategy(&self) -> SlicingStrategy {
        SlicingStrategy::BoundedContainers
    }

    async fn slice(
        &self,
        source: &dyn RenderSource,
        root_id: &str,
        ctx: &SliceContext<'_>,
    ) -> Result<Vec<CapturedPage>, ExportError> {
        let root = lookup(source, root_id)?;
        let total = measure_pages(root.as_ref(), ctx)?.get();
        let band_height = ctx.band_height_px();
        let mut pages = Vec::with_capacity(total as usize);

        for index in 0..total {
            ctx.check_cancelled(index, total)?;

            let container_id = page_container_id(root_id, index + 1);
            let container = lookup(source, &container_id)?;
            let raster = capture_with_timeout(container.as_ref(), &container_id, ctx).await?;
            let image = if raster.height() == band_height {
                raster
            } else {
                cut_band(&raster, 0, band_height, ctx.background)
            };

            debug!("Captured page container {container_id} ({}×{})", image.width(), image.height());
            pages.push(CapturedPage {
                index,
                image,
                quality: ctx.quality,
            });
        }

        Ok(pages)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Strategy B: single tall capture + band cropping
// ────────────────────────────────────────────────────────────────────────────

pub struct BandCropSlicer;

#[async_trait]
impl PageSlicer for BandCropSlicer {
    fn strategy(&self) -> SlicingStrategy {
        SlicingStrategy::BandCrop
    }

    async fn slice(
        &self,
        source: &dyn RenderSource,
        root_id: &str,
        ctx: &SliceContext<'_>,
    ) -> Result<Vec<CapturedPage>, ExportError> {
        let root = lookup(source, root_id)?;
        let total = measure_pages(root.as_ref(), ctx)?.get();
        ctx.check_cancelled(0, total)?;

        let raster = capture_with_timeout(root.as_ref(), root_id, ctx).await?;
        let band_height = ctx.band_height_px();
        debug!(
            "Captured {root_id} as {}×{} raster, cutting {total} bands of {band_height}px",
            raster.width(),
            raster.height()
        );

        let mut pages = Vec::with_capacity(total as usize);
        for index in 0..total {
            ctx.check_cancelled(index, total)?;
            pages.push(CapturedPage {
                index,
                image: cut_band(&raster, ctx.band_top_px(index), band_height, ctx.background),
                quality: ctx.quality,
            });
        }

        Ok(pages)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
