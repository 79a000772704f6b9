//! Asset acquisition: catalog, sticker images and the text font

use std::path::{Component, Path};
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::catalog::{Catalog, SharedCatalog};
use crate::config::{with_prefixes, StickerConfig};
use crate::errors::{Result, StickerError};
use crate::layout::{DataLayout, FONT_FILE_NAME};
use crate::net::Fetcher;

/// Maximum concurrent image downloads
pub const MAX_CONCURRENT_DOWNLOADS: usize = 10;

/// Catalog location relative to an assets mirror
const CATALOG_REMOTE_PATH: &str = "src/characters.json";

/// Image directory relative to an assets mirror
const IMAGE_REMOTE_PREFIX: &str = "public/img/";

/// Font directory relative to a repository mirror
const FONT_REMOTE_PREFIX: &str = "fonts/";

/// Populates the data root from the configured mirrors
#[derive(Debug, Clone)]
pub struct AssetAcquirer {
    fetcher: Fetcher,
    layout: DataLayout,
    config: Arc<StickerConfig>,
    catalog: SharedCatalog,
}

impl AssetAcquirer {
    pub fn new(
        fetcher: Fetcher,
        layout: DataLayout,
        config: Arc<StickerConfig>,
        catalog: SharedCatalog,
    ) -> Self {
        Self {
            fetcher,
            layout,
            config,
            catalog,
        }
    }

    pub fn catalog(&self) -> &SharedCatalog {
        &self.catalog
    }

    /// Bootstrap directories, then fetch catalog + images alongside the font
    pub async fn prepare(&self) -> Result<()> {
        self.layout.ensure_directories().await?;

        tokio::try_join!(
            async {
                self.load_catalog().await?;
                self.ensure_sticker_images().await
            },
            self.ensure_font(),
        )?;

        info!("Resources ready, {} sticker(s) loaded", self.catalog.snapshot().len());
        Ok(())
    }

    /// Download the catalog, falling back to the last persisted copy
    pub async fn load_catalog(&self) -> Result<()> {
        let path = self.layout.catalog_path();
        let urls = with_prefixes(CATALOG_REMOTE_PATH, &self.config.assets_mirrors);

        let catalog = match self.fetcher.fetch_text(&urls, self.config.request_retries).await {
            Ok(text) => {
                let catalog = Catalog::from_json(&text)?;
                if let Err(e) = tokio::fs::write(&path, &text).await {
                    warn!("Failed to persist catalog to {:?}: {}", path, e);
                }
                catalog
            }
            Err(fetch_error) => {
                let Ok(text) = tokio::fs::read_to_string(&path).await else {
                    error!("Catalog download failed and no local copy exists: {}", fetch_error);
                    return Err(fetch_error);
                };
                warn!("Catalog download failed, using local copy: {}", fetch_error);
                Catalog::from_json(&text)?
            }
        };

        debug!("Catalog loaded with {} sticker(s)", catalog.len());
        self.catalog.replace(catalog);
        Ok(())
    }

    /// Download the font unless a bundled or previously downloaded copy exists
    pub async fn ensure_font(&self) -> Result<()> {
        if self.layout.bundled_font_path().exists() {
            debug!("Using bundled font");
            return Ok(());
        }

        let path = self.layout.downloaded_font_path();
        if path.exists() {
            return Ok(());
        }

        let urls = with_prefixes(
            &format!("{FONT_REMOTE_PREFIX}{FONT_FILE_NAME}"),
            &self.config.repo_mirrors,
        );
        let data = self.fetcher.fetch_bytes(&urls, self.config.request_retries).await?;
        write_file(&path, &data).await?;
        info!("Downloaded font to {:?}", path);
        Ok(())
    }

    /// Download every sticker image missing locally.
    ///
    /// Downloads run with at most [`MAX_CONCURRENT_DOWNLOADS`] in flight. A
    /// failed download does not stop the others; the first failure is
    /// returned once all of them have finished.
    pub async fn ensure_sticker_images(&self) -> Result<()> {
        let catalog = self.catalog.snapshot();

        let mut missing: Vec<&str> = catalog
            .iter()
            .map(|s| s.image.as_str())
            .filter(|image| !self.layout.sticker_image_path(image).exists())
            .collect();
        missing.sort_unstable();
        missing.dedup();

        if missing.is_empty() {
            return Ok(());
        }

        info!("Downloading {} missing sticker image(s)", missing.len());
        let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_DOWNLOADS));

        let downloads = missing.iter().map(|image| {
            let semaphore = Arc::clone(&semaphore);
            async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .map_err(|e| StickerError::Io(std::io::Error::other(e)))?;
                self.download_image(image).await
            }
        });

        let failures: Vec<StickerError> = join_all(downloads)
            .await
            .into_iter()
            .filter_map(std::result::Result::err)
            .collect();

        match failures.into_iter().next() {
            None => Ok(()),
            Some(first) => {
                error!("Sticker image download failed: {}", first);
                Err(first)
            }
        }
    }

    async fn download_image(&self, image: &str) -> Result<()> {
        if !is_safe_relative(image) {
            return Err(StickerError::Catalog(format!("unsafe image path: {image}")));
        }

        let path = self.layout.sticker_image_path(image);
        let urls = with_prefixes(&format!("{IMAGE_REMOTE_PREFIX}{image}"), &self.config.assets_mirrors);
        let data = self.fetcher.fetch_bytes(&urls, self.config.request_retries).await?;
        write_file(&path, &data).await
    }
}

/// Relative path that stays inside its root
fn is_safe_relative(path: &str) -> bool {
    !path.is_empty()
        && Path::new(path)
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

async fn write_file(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, data)
        .await
        .map_err(|e| StickerError::FileWrite {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::sample_catalog_json;
    use crate::net::fetcher::tests::ScriptedTransport;
    use crate::net::{FetchError, HttpTransport};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    const ASSETS: &str = "https://assets.example/";
    const REPO: &str = "https://repo.example/";

    fn acquirer(temp: &TempDir, transport: Arc<ScriptedTransport>) -> AssetAcquirer {
        let config = StickerConfig {
            request_retries: 0,
            assets_mirrors: vec![ASSETS.to_string()],
            repo_mirrors: vec![REPO.to_string()],
            ..StickerConfig::default()
        };
        AssetAcquirer::new(
            Fetcher::new(transport),
            DataLayout::new(temp.path().join("data"), temp.path().join("bundled")),
            Arc::new(config),
            SharedCatalog::default(),
        )
    }

    fn script_images(transport: &ScriptedTransport) {
        for image in ["ena/Ena_01.png", "miku/Miku_01.png", "miku/Miku_02.png"] {
            transport.respond(&format!("{ASSETS}public/img/{image}"), Ok(image.as_bytes()));
        }
    }

    #[tokio::test]
    async fn test_prepare_downloads_everything() {
        let temp = TempDir::new().unwrap();
        let transport = Arc::new(ScriptedTransport::default());
        let catalog = sample_catalog_json();
        transport.respond(&format!("{ASSETS}src/characters.json"), Ok(catalog.as_bytes()));
        transport.respond(&format!("{REPO}fonts/{FONT_FILE_NAME}"), Ok(b"font"));
        script_images(&transport);

        let acquirer = acquirer(&temp, transport.clone());
        acquirer.prepare().await.unwrap();

        let layout = &acquirer.layout;
        assert_eq!(acquirer.catalog().snapshot().len(), 3);
        assert!(layout.catalog_path().exists());
        assert!(layout.downloaded_font_path().exists());
        assert_eq!(
            std::fs::read(layout.sticker_image_path("miku/Miku_02.png")).unwrap(),
            b"miku/Miku_02.png"
        );
        // catalog + font + 3 images
        assert_eq!(transport.attempts(), 5);
    }

    #[tokio::test]
    async fn test_prepare_again_only_fetches_catalog() {
        let temp = TempDir::new().unwrap();
        let transport = Arc::new(ScriptedTransport::default());
        let catalog = sample_catalog_json();
        transport.respond(&format!("{ASSETS}src/characters.json"), Ok(catalog.as_bytes()));
        transport.respond(&format!("{ASSETS}src/characters.json"), Ok(catalog.as_bytes()));
        transport.respond(&format!("{REPO}fonts/{FONT_FILE_NAME}"), Ok(b"font"));
        script_images(&transport);

        let acquirer = acquirer(&temp, transport.clone());
        acquirer.prepare().await.unwrap();
        acquirer.prepare().await.unwrap();

        assert_eq!(transport.attempts(), 6);
    }

    #[tokio::test]
    async fn test_catalog_falls_back_to_local_copy() {
        let temp = TempDir::new().unwrap();
        let transport = Arc::new(ScriptedTransport::default());
        let acquirer = acquirer(&temp, transport.clone());
        acquirer.layout.ensure_directories().await.unwrap();
        std::fs::write(acquirer.layout.catalog_path(), sample_catalog_json()).unwrap();

        acquirer.load_catalog().await.unwrap();
        assert_eq!(acquirer.catalog().snapshot().len(), 3);
    }

    #[tokio::test]
    async fn test_catalog_failure_without_local_copy() {
        let temp = TempDir::new().unwrap();
        let transport = Arc::new(ScriptedTransport::default());
        let acquirer = acquirer(&temp, transport);
        acquirer.layout.ensure_directories().await.unwrap();

        let err = acquirer.load_catalog().await.unwrap_err();
        assert!(matches!(err, StickerError::SourceUnavailable { .. }));
        assert!(acquirer.catalog().snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_bundled_font_skips_download() {
        let temp = TempDir::new().unwrap();
        let transport = Arc::new(ScriptedTransport::default());
        let acquirer = acquirer(&temp, transport.clone());
        std::fs::create_dir_all(temp.path().join("bundled/fonts")).unwrap();
        std::fs::write(acquirer.layout.bundled_font_path(), b"font").unwrap();

        acquirer.ensure_font().await.unwrap();
        assert_eq!(transport.attempts(), 0);
    }

    #[tokio::test]
    async fn test_one_failed_image_does_not_cancel_others() {
        let temp = TempDir::new().unwrap();
        let transport = Arc::new(ScriptedTransport::default());
        transport.respond(&format!("{ASSETS}public/img/ena/Ena_01.png"), Ok(b"ena"));
        transport.respond(
            &format!("{ASSETS}public/img/miku/Miku_01.png"),
            Err(FetchError::Status(500)),
        );
        transport.respond(&format!("{ASSETS}public/img/miku/Miku_02.png"), Ok(b"miku"));

        let acquirer = acquirer(&temp, transport.clone());
        acquirer.layout.ensure_directories().await.unwrap();
        acquirer
            .catalog()
            .replace(Catalog::from_json(&sample_catalog_json()).unwrap());

        let err = acquirer.ensure_sticker_images().await.unwrap_err();
        assert!(matches!(err, StickerError::SourceUnavailable { .. }));
        assert!(acquirer.layout.sticker_image_path("ena/Ena_01.png").exists());
        assert!(acquirer.layout.sticker_image_path("miku/Miku_02.png").exists());
        assert!(!acquirer.layout.sticker_image_path("miku/Miku_01.png").exists());
    }

    /// Succeeds slowly and records how many requests overlap
    #[derive(Default)]
    struct GaugedTransport {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl HttpTransport for GaugedTransport {
        async fn get(&self, url: &str) -> std::result::Result<Bytes, FetchError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(Bytes::copy_from_slice(url.as_bytes()))
        }
    }

    fn large_catalog_json(count: usize) -> String {
        let stickers: Vec<String> = (0..count)
            .map(|i| {
                format!(
                    r##"{{"name":"Miku {i:02}","character":"Miku","img":"miku/Miku_{i:02}.png","color":"#33ccbb",
                    "defaultText":{{"text":"Hi","x":148,"y":58,"r":-2,"s":47}}}}"##
                )
            })
            .collect();
        format!("[{}]", stickers.join(","))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_image_downloads_stay_within_limit() {
        let temp = TempDir::new().unwrap();
        let transport = Arc::new(GaugedTransport::default());
        let config = StickerConfig {
            request_retries: 0,
            assets_mirrors: vec![ASSETS.to_string()],
            ..StickerConfig::default()
        };
        let acquirer = AssetAcquirer::new(
            Fetcher::new(transport.clone()),
            DataLayout::new(temp.path().join("data"), temp.path().join("bundled")),
            Arc::new(config),
            SharedCatalog::default(),
        );
        acquirer.layout.ensure_directories().await.unwrap();
        acquirer
            .catalog()
            .replace(Catalog::from_json(&large_catalog_json(35)).unwrap());

        acquirer.ensure_sticker_images().await.unwrap();

        let peak = transport.peak.load(Ordering::SeqCst);
        assert_eq!(peak, MAX_CONCURRENT_DOWNLOADS);
        assert!(acquirer.layout.sticker_image_path("miku/Miku_34.png").exists());
    }

    #[test]
    fn test_is_safe_relative() {
        assert!(is_safe_relative("miku/Miku_01.png"));
        assert!(!is_safe_relative("../etc/passwd"));
        assert!(!is_safe_relative("/etc/passwd"));
        assert!(!is_safe_relative(""));
    }
}
