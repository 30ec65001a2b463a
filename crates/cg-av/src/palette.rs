//! Scoped temporary palette file.
//!
//! A [`PaletteFile`] owns the intermediate palette image for exactly one
//! conversion run and deletes it when dropped, on every exit path.

use std::path::{Path, PathBuf};

use tempfile::TempPath;

/// Temporary `.png` palette, removed on drop.
///
/// The file name is `clipgif-palette-<pid>-<random>.png`, so concurrent runs
/// inside one process and across processes never collide.
#[derive(Debug)]
pub struct PaletteFile {
    path: Option<TempPath>,
}

impl PaletteFile {
    /// Create an empty palette file in the system temp directory.
    pub fn create() -> cg_core::Result<Self> {
        Self::create_in(&std::env::temp_dir())
    }

    /// Create an empty palette file inside `dir`.
    pub fn create_in(dir: &Path) -> cg_core::Result<Self> {
        let prefix = format!("clipgif-palette-{}-", std::process::id());
        let file = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(".png")
            .tempfile_in(dir)?;

        Ok(Self {
            path: Some(file.into_temp_path()),
        })
    }

    pub fn path(&self) -> &Path {
        self.path.as_deref().unwrap_or_else(|| Path::new(""))
    }

    pub fn to_path_buf(&self) -> PathBuf {
        self.path().to_path_buf()
    }
}

impl Drop for PaletteFile {
    fn drop(&mut self) {
        let Some(path) = self.path.take() else {
            return;
        };
        let shown = path.to_path_buf();
        match path.close() {
            Ok(()) => tracing::debug!("Removed palette {}", shown.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::debug!("Failed to remove palette {}: {e}", shown.display()),
        }
    }
}
