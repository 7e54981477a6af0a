//! Font catalog: makes sure a resume font family is available before capture.
//!
//! A capture taken while a web font is still missing renders with fallback glyphs, so
//! the export orchestrator awaits [`FontCatalog::ensure_loaded`] first. Loading is
//! cached per family; a failure is reported to the caller, which decides whether it is
//! fatal (the orchestrator only warns).

pub mod catalog;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use catalog::DirectoryFontCatalog;

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum FontError {
    #[error("Font family '{0}' is not supported")]
    UnsupportedFamily(String),

    #[error("No font file found for '{0}'")]
    Missing(String),

    #[error("Failed to read font file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} is not a TrueType, OpenType or WOFF2 font")]
    InvalidFontData(PathBuf),
}

// ────────────────────────────────────────────────────────────────────────────
// Font families
// ────────────────────────────────────────────────────────────────────────────

/// The font families offered by the resume templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FontFamily {
    Inter,
    Roboto,
    OpenSans,
    Lato,
    Montserrat,
    SourceSansPro,
    Raleway,
    Poppins,
    PlayfairDisplay,
    Merriweather,
}

impl FontFamily {
    pub const ALL: [FontFamily; 10] = [
        FontFamily::Inter,
        FontFamily::Roboto,
        FontFamily::OpenSans,
        FontFamily::Lato,
        FontFamily::Montserrat,
        FontFamily::SourceSansPro,
        FontFamily::Raleway,
        FontFamily::Poppins,
        FontFamily::PlayfairDisplay,
        FontFamily::Merriweather,
    ];

    /// Display name, as used in CSS `font-family`.
    pub fn name(self) -> &'static str {
        match self {
            FontFamily::Inter => "Inter",
            FontFamily::Roboto => "Roboto",
            FontFamily::OpenSans => "Open Sans",
            FontFamily::Lato => "Lato",
            FontFamily::Montserrat => "Montserrat",
            FontFamily::SourceSansPro => "Source Sans Pro",
            FontFamily::Raleway => "Raleway",
            FontFamily::Poppins => "Poppins",
            FontFamily::PlayfairDisplay => "Playfair Display",
            FontFamily::Merriweather => "Merriweather",
        }
    }

    /// File name stem of the regular weight, e.g. `OpenSans-Regular`.
    pub fn file_stem(self) -> String {
        format!("{}-Regular", self.name().replace(' ', ""))
    }
}

impl fmt::Display for FontFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FontFamily {
    type Err = FontError;

    /// Accepts the display name in any case, with or without spaces
    /// (`"Open Sans"`, `"opensans"`), and ignores CSS quoting.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted: String = s
            .trim()
            .trim_matches(|c: char| c == '"' || c == '\'')
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();

        FontFamily::ALL
            .into_iter()
            .find(|family| family.name().replace(' ', "").to_ascii_lowercase() == wanted)
            .ok_or_else(|| FontError::UnsupportedFamily(s.trim().to_string()))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Trait
// ────────────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait FontCatalog: Send + Sync {
    /// Resolves once `family` is usable for rendering. Repeated calls for a loaded
    /// family return immediately.
    async fn ensure_loaded(&self, family: &str) -> Result<(), FontError>;
}
