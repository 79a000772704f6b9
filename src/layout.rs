//! On-disk layout of the data root
//!
//! ```text
//! <data>/characters.json       catalog, verbatim copy of the last good download
//! <data>/fonts/<font>          downloaded font (unless a bundled one exists)
//! <data>/resource/<image>      sticker images, mirroring catalog paths
//! <data>/cache/<key>.<ext>     rendered images
//! ```

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::errors::Result;

/// File name of the text font
pub const FONT_FILE_NAME: &str = "YurukaFangTang.ttf";

/// Resolved paths for every persisted artifact
#[derive(Debug, Clone)]
pub struct DataLayout {
    data_root: PathBuf,
    bundled_root: PathBuf,
}

impl DataLayout {
    pub fn new(data_root: impl Into<PathBuf>, bundled_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            bundled_root: bundled_root.into(),
        }
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    pub fn bundled_root(&self) -> &Path {
        &self.bundled_root
    }

    pub fn font_dir(&self) -> PathBuf {
        self.data_root.join("fonts")
    }

    pub fn resource_dir(&self) -> PathBuf {
        self.data_root.join("resource")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.data_root.join("cache")
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.data_root.join("characters.json")
    }

    /// Font shipped alongside the binary
    pub fn bundled_font_path(&self) -> PathBuf {
        self.bundled_root.join("fonts").join(FONT_FILE_NAME)
    }

    pub fn downloaded_font_path(&self) -> PathBuf {
        self.font_dir().join(FONT_FILE_NAME)
    }

    /// Font used for rendering; the bundled copy wins when present
    pub fn font_path(&self) -> PathBuf {
        let bundled = self.bundled_font_path();
        if bundled.exists() {
            bundled
        } else {
            self.downloaded_font_path()
        }
    }

    /// Local path of a sticker image given its catalog-relative path
    pub fn sticker_image_path(&self, relative: &str) -> PathBuf {
        self.resource_dir().join(relative)
    }

    /// Create the data root and its subdirectories
    pub async fn ensure_directories(&self) -> Result<()> {
        for dir in [
            self.data_root.clone(),
            self.font_dir(),
            self.resource_dir(),
            self.cache_dir(),
        ] {
            if !tokio::fs::try_exists(&dir).await.unwrap_or(false) {
                tokio::fs::create_dir_all(&dir).await?;
                debug!("Created data directory: {:?}", dir);
            }
        }
        Ok(())
    }
}
