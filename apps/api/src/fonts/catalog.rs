use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::fonts::{FontCatalog, FontError, FontFamily};

const EXTENSIONS: [&str; 3] = ["ttf", "otf", "woff2"];

/// Font catalog backed by font files on disk.
///
/// Looks for `<Family>-Regular.{ttf,otf,woff2}` in each search directory in order.
/// This is an availability check: glyphs are embedded by whatever renders the document,
/// so only the resolved path of each family is cached, never the font data.
#[derive(Debug, Default)]
pub struct DirectoryFontCatalog {
    search_dirs: Vec<PathBuf>,
    loaded: RwLock<HashMap<FontFamily, PathBuf>>,
}

impl DirectoryFontCatalog {
    pub fn new(search_dirs: Vec<PathBuf>) -> Self {
        Self {
            search_dirs,
            loaded: RwLock::new(HashMap::new()),
        }
    }

    /// `extra_dir` first, then `assets/fonts` next to the executable, then the crate's
    /// own `assets/fonts`.
    pub fn with_default_dirs(extra_dir: Option<PathBuf>) -> Self {
        let mut dirs: Vec<PathBuf> = extra_dir.into_iter().collect();
        if let Some(exe_dir) = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
        {
            dirs.push(exe_dir.join("assets").join("fonts"));
        }
        dirs.push(Path::new(env!("CARGO_MANIFEST_DIR")).join("assets").join("fonts"));
        Self::new(dirs)
    }

    pub fn search_dirs(&self) -> &[PathBuf] {
        &self.search_dirs
    }

    /// Path the family was resolved to, once [`FontCatalog::ensure_loaded`] succeeded.
    pub async fn loaded_path(&self, family: FontFamily) -> Option<PathBuf> {
        self.loaded.read().await.get(&family).cloned()
    }

    async fn locate(&self, family: FontFamily) -> Option<PathBuf> {
        let stem = family.file_stem();
        for dir in &self.search_dirs {
            for ext in EXTENSIONS {
                let candidate = dir.join(format!("{stem}.{ext}"));
                if tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
                    return Some(candidate);
                }
            }
        }
        None
    }
}

/// TrueType (`00 01 00 00` / `true`), OpenType CFF (`OTTO`) or WOFF2 (`wOF2`).
fn has_font_signature(header: &[u8; 4]) -> bool {
    matches!(header, b"\x00\x01\x00\x00" | b"true" | b"OTTO" | b"wOF2")
}

/// Reads the 4-byte signature; `None` when the file is shorter than that.
async fn read_signature(path: &Path) -> Result<Option<[u8; 4]>, FontError> {
    let io_error = |source| FontError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = tokio::fs::File::open(path).await.map_err(io_error)?;
    let mut header = [0u8; 4];
    match file.read_exact(&mut header).await {
        Ok(_) => Ok(Some(header)),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(io_error(e)),
    }
}

#[async_trait]
impl FontCatalog for DirectoryFontCatalog {
    async fn ensure_loaded(&self, family: &str) -> Result<(), FontError> {
        let family: FontFamily = family.parse()?;
        if self.loaded.read().await.contains_key(&family) {
            debug!("Font {family} already loaded");
            return Ok(());
        }

        let path = self
            .locate(family)
            .await
            .ok_or_else(|| FontError::Missing(family.to_string()))?;
        match read_signature(&path).await? {
            Some(header) if has_font_signature(&header) => {}
            _ => return Err(FontError::InvalidFontData(path)),
        }

        info!("Font {family} available at {}", path.display());
        self.loaded.write().await.insert(family, path);
        Ok(())
    }
}
