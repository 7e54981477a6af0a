//! PDF Assembler: places each captured page raster on its own physical PDF page.
//!
//! # Placement
//! Pixel sizes are converted to millimetres at [`CONTENT_DPI`] after dividing out the
//! capture quality, so a page captured at quality 2 has the same physical source size as
//! the same page captured at quality 1.
//!
//! - [`FitPolicy::Stretch`] fills the printable area exactly. Sub-percent aspect
//!   distortion is invisible on flat-colour resume pages.
//! - [`FitPolicy::PreserveAspect`] scales by `min(avail_w / src_w, avail_h / src_h)` and
//!   centres the image inside the printable area.
//!
//! Either way the placement box never leaves the printable area.
//!
//! The assembler is synchronous and CPU-bound. The orchestrator runs it inside
//! `tokio::task::spawn_blocking`.

use std::fmt;
use std::io::{BufWriter, Cursor, Write};
use std::str::FromStr;

use bytes::Bytes;
use image::DynamicImage;
use printpdf::{
    ColorBits, ColorSpace, Image, ImageTransform, ImageXObject, Mm, PdfDocument, Px,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::export::error::ExportError;
use crate::export::geometry::{pixels_to_units, PageGeometry, CONTENT_DPI, MM_PER_INCH};
use crate::export::slicer::CapturedPage;

/// printpdf sizes images at this DPI when told to; scale factors are relative to it.
const PLACEMENT_DPI: f64 = 72.0;
const LAYER_NAME: &str = "Layer 1";

// ────────────────────────────────────────────────────────────────────────────
// Types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FitPolicy {
    /// Stretch to exactly fill the printable area.
    #[default]
    Stretch,
    /// Keep the raster's aspect ratio and centre it.
    PreserveAspect,
}

impl fmt::Display for FitPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FitPolicy::Stretch => write!(f, "stretch"),
            FitPolicy::PreserveAspect => write!(f, "preserve-aspect"),
        }
    }
}

impl FromStr for FitPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stretch" | "fill" => Ok(FitPolicy::Stretch),
            "preserve-aspect" | "contain" => Ok(FitPolicy::PreserveAspect),
            other => Err(format!(
                "unknown fit policy '{other}' (expected 'stretch' or 'preserve-aspect')"
            )),
        }
    }
}

/// Where a page image landed, in millimetres from the top-left page corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PagePlacement {
    pub x_mm: f64,
    pub y_mm: f64,
    pub width_mm: f64,
    pub height_mm: f64,
}

/// A complete, ready-to-deliver PDF.
#[derive(Debug, Clone)]
pub struct ExportedDocument {
    pub filename: String,
    pub bytes: Bytes,
    pub page_count: u32,
    pub placements: Vec<PagePlacement>,
}

// ────────────────────────────────────────────────────────────────────────────
// Placement
// ────────────────────────────────────────────────────────────────────────────

/// Computes where a `width_px × height_px` raster captured at `quality` goes on a page.
pub fn compute_placement(
    width_px: u32,
    height_px: u32,
    quality: f32,
    geometry: &PageGeometry,
    fit: FitPolicy,
) -> Result<PagePlacement, ExportError> {
    if width_px == 0 || height_px == 0 {
        return Err(ExportError::AssemblyFailed(format!(
            "page raster is empty ({width_px}×{height_px})"
        )));
    }
    if !quality.is_finite() || quality <= 0.0 {
        return Err(ExportError::AssemblyFailed(format!(
            "invalid capture quality {quality}"
        )));
    }

    let available_w = geometry.printable_width_mm();
    let available_h = geometry.printable_height_mm();
    let margin = geometry.margin_mm;

    match fit {
        FitPolicy::Stretch => Ok(PagePlacement {
            x_mm: margin,
            y_mm: margin,
            width_mm: available_w,
            height_mm: available_h,
        }),
        FitPolicy::PreserveAspect => {
            let quality = f64::from(quality);
            let source_w = pixels_to_units(f64::from(width_px) / quality, CONTENT_DPI)?;
            let source_h = pixels_to_units(f64::from(height_px) / quality, CONTENT_DPI)?;
            let scale = (available_w / source_w).min(available_h / source_h);
            let width_mm = source_w * scale;
            let height_mm = source_h * scale;
            Ok(PagePlacement {
                x_mm: margin + (available_w - width_mm) / 2.0,
                y_mm: margin + (available_h - height_mm) / 2.0,
                width_mm,
                height_mm,
            })
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Assembler
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PdfAssembler {
    geometry: PageGeometry,
    fit: FitPolicy,
    title: String,
}

impl PdfAssembler {
    pub fn new(geometry: PageGeometry, fit: FitPolicy) -> Self {
        Self {
            geometry,
            fit,
            title: "Resume".to_string(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Builds the whole document in memory. Either every page is placed and the document
    /// serialized, or nothing is returned.
    pub fn assemble(
        &self,
        pages: Vec<CapturedPage>,
        filename: String,
    ) -> Result<ExportedDocument, ExportError> {
        if pages.is_empty() {
            return Err(ExportError::AssemblyFailed(
                "no pages to assemble".to_string(),
            ));
        }

        // Validate every page before building anything.
        let placements = pages
            .iter()
            .map(|page| {
                compute_placement(
                    page.width_px(),
                    page.height_px(),
                    page.quality,
                    &self.geometry,
                    self.fit,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let page_w = Mm(self.geometry.page_width_mm as f32);
        let page_h = Mm(self.geometry.page_height_mm as f32);
        let (doc, first_page, first_layer) =
            PdfDocument::new(self.title.as_str(), page_w, page_h, LAYER_NAME);

        let page_count = pages.len() as u32;
        for (position, (page, placement)) in pages.into_iter().zip(&placements).enumerate() {
            let layer = if position == 0 {
                doc.get_page(first_page).get_layer(first_layer)
            } else {
                let (page_index, layer_index) = doc.add_page(page_w, page_h, LAYER_NAME);
                doc.get_page(page_index).get_layer(layer_index)
            };

            let width_px = page.width_px();
            let height_px = page.height_px();
            let rgb = DynamicImage::ImageRgba8(page.image).into_rgb8();
            let image = Image::from(ImageXObject {
                width: Px(width_px as usize),
                height: Px(height_px as usize),
                color_space: ColorSpace::Rgb,
                bits_per_component: ColorBits::Bit8,
                interpolate: true,
                image_data: rgb.into_raw(),
                image_filter: None,
                clipping_bbox: None,
                smask: None,
            });

            // Natural size at PLACEMENT_DPI, then scaled onto the placement box.
            let natural_w = f64::from(width_px) * MM_PER_INCH / PLACEMENT_DPI;
            let natural_h = f64::from(height_px) * MM_PER_INCH / PLACEMENT_DPI;
            let bottom = self.geometry.page_height_mm - placement.y_mm - placement.height_mm;

            image.add_to_layer(
                layer,
                ImageTransform {
                    translate_x: Some(Mm(placement.x_mm as f32)),
                    translate_y: Some(Mm(bottom as f32)),
                    scale_x: Some((placement.width_mm / natural_w) as f32),
                    scale_y: Some((placement.height_mm / natural_h) as f32),
                    dpi: Some(PLACEMENT_DPI as f32),
                    ..Default::default()
                },
            );
            debug!(
                "Placed page {} ({width_px}×{height_px}px) at ({:.1}, {:.1}) {:.1}×{:.1}mm",
                page.index + 1,
                placement.x_mm,
                placement.y_mm,
                placement.width_mm,
                placement.height_mm
            );
        }

        let mut buffer = Vec::new();
        {
            let mut writer = BufWriter::new(Cursor::new(&mut buffer));
            doc.save(&mut writer)
                .map_err(|e| ExportError::AssemblyFailed(format!("failed to serialize PDF: {e}")))?;
            writer
                .flush()
                .map_err(|e| ExportError::AssemblyFailed(format!("failed to flush PDF: {e}")))?;
        }

        Ok(ExportedDocument {
            filename,
            bytes: Bytes::from(buffer),
            page_count,
            placements,
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
