//! Page Geometry: physical page formats and pixel/millimetre conversion.
//!
//! All physical measurements are millimetres. Pixel measurements are CSS pixels of the
//! rendered document unless a function says otherwise; the browser convention of
//! 96 px per inch is the assumed content DPI.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::export::error::ExportError;

pub const MM_PER_INCH: f64 = 25.4;
/// Pixel density the document is laid out at before any quality multiplier.
pub const CONTENT_DPI: f64 = 96.0;
/// Upper bound for an explicit per-page pixel budget. Roughly 4 m of content at 96 DPI.
pub const MAX_PIXELS_PER_PAGE: u32 = 16_384;

// ────────────────────────────────────────────────────────────────────────────
// Paper formats
// ────────────────────────────────────────────────────────────────────────────

/// The two supported physical page formats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaperFormat {
    /// 210 × 297 mm.
    #[default]
    A4,
    /// 216 × 279 mm (8.5" × 11", rounded to whole millimetres).
    Letter,
}

impl PaperFormat {
    /// Returns `(width_mm, height_mm)` in portrait orientation.
    pub fn dimensions_mm(self) -> (f64, f64) {
        match self {
            PaperFormat::A4 => (210.0, 297.0),
            PaperFormat::Letter => (216.0, 279.0),
        }
    }
}

impl fmt::Display for PaperFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaperFormat::A4 => write!(f, "a4"),
            PaperFormat::Letter => write!(f, "letter"),
        }
    }
}

impl FromStr for PaperFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "a4" => Ok(PaperFormat::A4),
            "letter" | "us-letter" => Ok(PaperFormat::Letter),
            other => Err(ExportError::InvalidGeometry(format!(
                "unknown paper format '{other}' (expected 'a4' or 'letter')"
            ))),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Unit conversion
// ────────────────────────────────────────────────────────────────────────────

fn require_positive(value: f64, name: &str) -> Result<f64, ExportError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(ExportError::InvalidGeometry(format!(
            "{name} must be a positive number, got {value}"
        )))
    }
}

/// Converts a physical length in millimetres to pixels at `dpi`.
pub fn units_to_pixels(units: f64, dpi: f64) -> Result<f64, ExportError> {
    let units = require_positive(units, "length")?;
    let dpi = require_positive(dpi, "dpi")?;
    Ok(units / MM_PER_INCH * dpi)
}

/// Converts a pixel length at `dpi` to millimetres.
pub fn pixels_to_units(px: f64, dpi: f64) -> Result<f64, ExportError> {
    let px = require_positive(px, "pixel length")?;
    let dpi = require_positive(dpi, "dpi")?;
    Ok(px / dpi * MM_PER_INCH)
}

// ────────────────────────────────────────────────────────────────────────────
// Page geometry
// ────────────────────────────────────────────────────────────────────────────

/// Immutable page configuration shared read-only by every pipeline stage.
///
/// `pixels_per_page` is the height budget, in content pixels, that maps onto the
/// printable height of one physical page. By default it is derived from the printable
/// height at [`CONTENT_DPI`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageGeometry {
    pub format: Option<PaperFormat>,
    pub page_width_mm: f64,
    pub page_height_mm: f64,
    pub margin_mm: f64,
    pub pixels_per_page: u32,
}

impl PageGeometry {
    /// Geometry for a named format with uniform margins.
    pub fn new(format: PaperFormat, margin_mm: f64) -> Result<Self, ExportError> {
        let (width, height) = format.dimensions_mm();
        let mut geometry = Self::custom(width, height, margin_mm, 1)?;
        geometry.format = Some(format);
        let printable_px = units_to_pixels(geometry.printable_height_mm(), CONTENT_DPI)?;
        geometry.with_pixels_per_page(printable_px.floor() as u32)
    }

    /// Geometry for an arbitrary page size and an explicit pixel budget.
    pub fn custom(
        page_width_mm: f64,
        page_height_mm: f64,
        margin_mm: f64,
        pixels_per_page: u32,
    ) -> Result<Self, ExportError> {
        require_positive(page_width_mm, "page width")?;
        require_positive(page_height_mm, "page height")?;
        if !margin_mm.is_finite() || margin_mm < 0.0 {
            return Err(ExportError::InvalidGeometry(format!(
                "margin must be a non-negative number, got {margin_mm}"
            )));
        }
        if page_width_mm - 2.0 * margin_mm <= 0.0 || page_height_mm - 2.0 * margin_mm <= 0.0 {
            return Err(ExportError::InvalidGeometry(format!(
                "margin {margin_mm}mm leaves no printable area on a {page_width_mm}×{page_height_mm}mm page"
            )));
        }

        Self {
            format: None,
            page_width_mm,
            page_height_mm,
            margin_mm,
            pixels_per_page: 1,
        }
        .with_pixels_per_page(pixels_per_page)
    }

    /// Replaces the pixel budget per page. Must be in `1..=MAX_PIXELS_PER_PAGE`.
    pub fn with_pixels_per_page(mut self, pixels_per_page: u32) -> Result<Self, ExportError> {
        if pixels_per_page == 0 {
            return Err(ExportError::InvalidGeometry(
                "pixels_per_page must be greater than zero".to_string(),
            ));
        }
        if pixels_per_page > MAX_PIXELS_PER_PAGE {
            return Err(ExportError::InvalidGeometry(format!(
                "pixels_per_page must be at most {MAX_PIXELS_PER_PAGE}, got {pixels_per_page}"
            )));
        }
        self.pixels_per_page = pixels_per_page;
        Ok(self)
    }

    pub fn printable_width_mm(&self) -> f64 {
        self.page_width_mm - 2.0 * self.margin_mm
    }

    pub fn printable_height_mm(&self) -> f64 {
        self.page_height_mm - 2.0 * self.margin_mm
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
