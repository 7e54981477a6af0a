use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use crate::export::orchestrator::{ExportLimits, MAX_QUALITY, MIN_QUALITY};
use crate::export::{FitPolicy, PageGeometry, PaperFormat, SlicingStrategy};

/// Application configuration loaded from environment variables.
/// Every variable is optional; malformed values fail startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub rust_log: String,
    pub default_format: PaperFormat,
    pub default_quality: f32,
    pub default_margin_mm: f64,
    pub fit_policy: FitPolicy,
    pub slicing_strategy: SlicingStrategy,
    pub capture_timeout: Duration,
    pub settle_delay: Duration,
    pub max_pages: u32,
    pub max_raster_pixels: u64,
    pub max_upload_bytes: usize,
    pub fonts_dir: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let config = Config {
            port: parse_or(&lookup, "PORT", 8080)?,
            rust_log: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            default_format: parse_or(&lookup, "EXPORT_DEFAULT_FORMAT", PaperFormat::A4)?,
            default_quality: parse_or(&lookup, "EXPORT_DEFAULT_QUALITY", 2.0)?,
            default_margin_mm: parse_or(&lookup, "EXPORT_DEFAULT_MARGIN_MM", 12.0)?,
            fit_policy: parse_or(&lookup, "EXPORT_FIT_POLICY", FitPolicy::Stretch)?,
            slicing_strategy: parse_or(&lookup, "EXPORT_SLICING_STRATEGY", SlicingStrategy::BandCrop)?,
            capture_timeout: Duration::from_millis(parse_or(&lookup, "EXPORT_CAPTURE_TIMEOUT_MS", 15_000)?),
            settle_delay: Duration::from_millis(parse_or(&lookup, "EXPORT_SETTLE_DELAY_MS", 100)?),
            max_pages: parse_or(&lookup, "EXPORT_MAX_PAGES", 20)?,
            max_raster_pixels: parse_or(&lookup, "EXPORT_MAX_RASTER_PIXELS", 1 << 28)?,
            max_upload_bytes: parse_or(&lookup, "EXPORT_MAX_UPLOAD_BYTES", 25 * 1024 * 1024)?,
            fonts_dir: lookup("RESUME_FONTS_DIR")
                .filter(|dir| !dir.trim().is_empty())
                .map(PathBuf::from),
        };
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<()> {
        if !(MIN_QUALITY..=MAX_QUALITY).contains(&self.default_quality) {
            return Err(anyhow!(
                "EXPORT_DEFAULT_QUALITY must be between {MIN_QUALITY} and {MAX_QUALITY}"
            ));
        }
        PageGeometry::new(self.default_format, self.default_margin_mm)
            .context("EXPORT_DEFAULT_MARGIN_MM leaves no printable area")?;
        if self.capture_timeout.is_zero() {
            return Err(anyhow!("EXPORT_CAPTURE_TIMEOUT_MS must be greater than zero"));
        }
        if self.max_pages == 0 {
            return Err(anyhow!("EXPORT_MAX_PAGES must be greater than zero"));
        }
        if self.max_raster_pixels == 0 {
            return Err(anyhow!("EXPORT_MAX_RASTER_PIXELS must be greater than zero"));
        }
        Ok(())
    }

    pub fn export_limits(&self) -> ExportLimits {
        ExportLimits {
            capture_timeout: self.capture_timeout,
            settle_delay: self.settle_delay,
            max_pages: self.max_pages,
            max_raster_pixels: self.max_raster_pixels,
            ..ExportLimits::default()
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow!("{e}"))
            .with_context(|| format!("Environment variable '{key}' has an invalid value '{raw}'")),
        _ => Ok(default),
    }
}
