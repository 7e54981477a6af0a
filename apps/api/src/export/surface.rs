//! Render sources: the addressable, fully laid-out containers the exporter captures.
//!
//! A host (browser bridge, headless renderer, or the HTTP upload path) registers one
//! surface per container id. The root container holds the whole document; page
//! containers follow the `<base_id>-page-<n>` convention (1-based) and each shows one
//! page-height slice of the document translated up by `(n - 1) * pixels_per_page`.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

use crate::export::error::ExportError;
use crate::export::pagination::{estimate_from_measurement, PageEstimate};
use crate::export::geometry::PageGeometry;

/// Page background used when a capture has transparent or missing content.
pub const PAGE_BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);

// ────────────────────────────────────────────────────────────────────────────
// Traits
// ────────────────────────────────────────────────────────────────────────────

/// Laid-out size of a container in content (CSS) pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceSize {
    pub width_px: u32,
    pub height_px: u32,
}

/// Parameters for a single raster capture.
#[derive(Debug, Clone, Copy)]
pub struct CaptureRequest {
    /// Raster scale multiplier (the export quality).
    pub scale: f32,
    /// Fill applied underneath the content so transparent regions come out opaque.
    pub background: Rgba<u8>,
}

/// A laid-out container that can be measured and rasterized.
#[async_trait]
pub trait RenderSurface: Send + Sync {
    /// Current layout size, or `None` when the container is not mounted / laid out.
    fn measure(&self) -> Option<SurfaceSize>;

    /// Rasterizes the container at `request.scale` over `request.background`.
    async fn capture(&self, request: &CaptureRequest) -> Result<RgbaImage, ExportError>;
}

/// Lookup of containers by id.
pub trait RenderSource: Send + Sync {
    fn lookup(&self, id: &str) -> Option<Arc<dyn RenderSurface>>;
}

/// Id of the `page_number`-th (1-based) bounded page container of `base_id`.
pub fn page_container_id(base_id: &str, page_number: u32) -> String {
    format!("{base_id}-page-{page_number}")
}

// ────────────────────────────────────────────────────────────────────────────
// RasterSurface: a container backed by an already rendered bitmap
// ────────────────────────────────────────────────────────────────────────────

/// Container backed by a bitmap of the rendered document.
///
/// `device_scale` is the pixel density the bitmap was rendered at relative to content
/// pixels (2.0 for a bitmap rendered on a HiDPI screen). A clip turns the surface into a
/// bounded page container: only `clip_height_px` content pixels starting at
/// `offset_px` are visible, and the remainder below the document end is background.
#[derive(Debug, Clone)]
pub struct RasterSurface {
    bitmap: Arc<RgbaImage>,
    device_scale: f32,
    clip: Option<(u32, u32)>,
}

impl RasterSurface {
    pub fn new(bitmap: RgbaImage) -> Self {
        Self::shared(Arc::new(bitmap))
    }

    pub fn shared(bitmap: Arc<RgbaImage>) -> Self {
        Self {
            bitmap,
            device_scale: 1.0,
            clip: None,
        }
    }

    pub fn with_device_scale(mut self, device_scale: f32) -> Self {
        if device_scale.is_finite() && device_scale > 0.0 {
            self.device_scale = device_scale;
        }
        self
    }

    /// Bounded view of `height_px` content pixels starting at `offset_px`.
    pub fn clipped(&self, offset_px: u32, height_px: u32) -> Self {
        Self {
            bitmap: Arc::clone(&self.bitmap),
            device_scale: self.device_scale,
            clip: Some((offset_px, height_px)),
        }
    }

    fn content_size(&self) -> SurfaceSize {
        let to_content = |px: u32| (px as f32 / self.device_scale).round() as u32;
        SurfaceSize {
            width_px: to_content(self.bitmap.width()),
            height_px: to_content(self.bitmap.height()),
        }
    }
}

#[async_trait]
impl RenderSurface for RasterSurface {
    fn measure(&self) -> Option<SurfaceSize> {
        let full = self.content_size();
        if full.width_px == 0 {
            return None;
        }
        Some(match self.clip {
            Some((_, height_px)) => SurfaceSize {
                width_px: full.width_px,
                height_px,
            },
            None => full,
        })
    }

    async fn capture(&self, request: &CaptureRequest) -> Result<RgbaImage, ExportError> {
        let size = self.measure().ok_or_else(|| ExportError::CaptureFailed {
            target: "raster surface".to_string(),
            reason: "surface has no laid-out width".to_string(),
        })?;
        if !request.scale.is_finite() || request.scale <= 0.0 {
            return Err(ExportError::CaptureFailed {
                target: "raster surface".to_string(),
                reason: format!("invalid capture scale {}", request.scale),
            });
        }

        // Visible window of the bitmap, in bitmap pixels.
        let (offset_px, height_px) = self.clip.unwrap_or((0, size.height_px));
        let to_bitmap = |px: u32| (px as f32 * self.device_scale).round() as u32;
        let window_top = to_bitmap(offset_px).min(self.bitmap.height());
        let window_height = to_bitmap(height_px);
        let visible = window_height.min(self.bitmap.height() - window_top);

        let mut canvas = RgbaImage::from_pixel(self.bitmap.width(), window_height.max(1), request.background);
        if visible > 0 {
            let content =
                imageops::crop_imm(self.bitmap.as_ref(), 0, window_top, self.bitmap.width(), visible)
                    .to_image();
            imageops::overlay(&mut canvas, &content, 0, 0);
        }

        let factor = request.scale / self.device_scale;
        if (factor - 1.0).abs() < f32::EPSILON {
            return Ok(canvas);
        }
        let width = ((size.width_px as f32) * request.scale).round().max(1.0) as u32;
        let height = ((height_px as f32) * request.scale).round().max(1.0) as u32;
        Ok(imageops::resize(&canvas, width, height, FilterType::Triangle))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// InMemoryRenderSource
// ────────────────────────────────────────────────────────────────────────────

/// Registry of mounted containers keyed by id.
#[derive(Default)]
pub struct InMemoryRenderSource {
    surfaces: RwLock<HashMap<String, Arc<dyn RenderSurface>>>,
}

impl InMemoryRenderSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mount(&self, id: impl Into<String>, surface: Arc<dyn RenderSurface>) {
        if let Ok(mut surfaces) = self.surfaces.write() {
            surfaces.insert(id.into(), surface);
        }
    }

    pub fn unmount(&self, id: &str) {
        if let Ok(mut surfaces) = self.surfaces.write() {
            surfaces.remove(id);
            let prefix = format!("{id}-page-");
            surfaces.retain(|key, _| !key.starts_with(&prefix));
        }
    }

    /// Mounts a rendered document as `base_id` plus one bounded page container per
    /// estimated page, the way the live preview lays out its page containers.
    pub fn mount_paged(
        &self,
        base_id: &str,
        document: RasterSurface,
        geometry: &PageGeometry,
    ) -> PageEstimate {
        self.unmount(base_id);
        let height = document.measure().map(|size| size.height_px);
        let estimate = estimate_from_measurement(height, geometry);

        for page_number in 1..=estimate.get() {
            let offset = (page_number - 1) * geometry.pixels_per_page;
            let page = document.clipped(offset, geometry.pixels_per_page);
            self.mount(page_container_id(base_id, page_number), Arc::new(page));
        }
        self.mount(base_id, Arc::new(document));
        estimate
    }
}

impl RenderSource for InMemoryRenderSource {
    fn lookup(&self, id: &str) -> Option<Arc<dyn RenderSurface>> {
        self.surfaces
            .read()
            .ok()
            .and_then(|surfaces| surfaces.get(id).cloned())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
