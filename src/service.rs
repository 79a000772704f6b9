//! Sticker service: the surface the command layer talks to

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use crate::assets::AssetAcquirer;
use crate::cache::ContentCache;
use crate::catalog::{SharedCatalog, StickerDescriptor};
use crate::config::StickerConfig;
use crate::errors::{Result, StickerError};
use crate::layout::DataLayout;
use crate::net::{Fetcher, HttpTransport, PooledClient};
use crate::render::{EngineLauncher, PlacementOverrides, RenderSession, StickerRenderer, VirtualRouter};

/// Usage text rendered by [`StickerService::render_help`]
pub const HELP_TEXT: &str = "\
Project Sekai sticker generator

Usage:
  sekai-stickers render [TEXT]... [-i ID] [-x X] [-y Y] [-r DEG] [-s SIZE] [-c COLOR]
  sekai-stickers list [CHARACTER]

Options:
  TEXT            Sticker text, the sticker's default text when empty
  -i, --id        Sticker id, see `sekai-stickers list`
  -x, -y          Center of the text
  -r, --rotate    Text rotation in degrees
  -s, --size      Font size, auto-fitted when omitted
  -c, --color     Text color, hex
  -W              Stroke width
  -C              Stroke color, hex
  -S              Line spacing

Prefix a number with ^ to offset the default, e.g. -y ^-10

Examples:
  sekai-stickers render Hello world
  sekai-stickers render -i 1 Hello
  sekai-stickers list Miku";

/// Wires acquisition, catalog, cache and rendering together
#[derive(Debug)]
pub struct StickerService {
    config: Arc<StickerConfig>,
    layout: DataLayout,
    fetcher: Fetcher,
    catalog: SharedCatalog,
    acquirer: AssetAcquirer,
    cache: ContentCache,
    renderer: StickerRenderer,
    cache_cleared: AtomicBool,
}

impl StickerService {
    /// Service backed by the pooled HTTP client
    pub fn new(config: StickerConfig, launcher: Arc<dyn EngineLauncher>) -> Result<Self> {
        let transport = Arc::new(PooledClient::new(config.request_timeout()));
        Self::with_transport(config, transport, launcher)
    }

    /// Service over an arbitrary transport
    pub fn with_transport(
        config: StickerConfig,
        transport: Arc<dyn HttpTransport>,
        launcher: Arc<dyn EngineLauncher>,
    ) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);

        let layout = DataLayout::new(config.data_root(), config.bundled_root());
        let fetcher = Fetcher::new(transport);
        let catalog = SharedCatalog::default();
        let acquirer = AssetAcquirer::new(
            fetcher.clone(),
            layout.clone(),
            Arc::clone(&config),
            catalog.clone(),
        );

        let cache = ContentCache::new(layout.cache_dir(), config.use_cache);
        let session = RenderSession::new(launcher, Arc::new(VirtualRouter::new(&layout)));
        let renderer = StickerRenderer::new(Arc::new(session), cache.clone(), layout.clone());

        info!("Sticker service using data root {:?}", layout.data_root());
        Ok(Self {
            config,
            layout,
            fetcher,
            catalog,
            acquirer,
            cache,
            renderer,
            cache_cleared: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &StickerConfig {
        &self.config
    }

    pub fn layout(&self) -> &DataLayout {
        &self.layout
    }

    pub fn catalog(&self) -> &SharedCatalog {
        &self.catalog
    }

    /// Download whatever is missing. Safe to call again; only the catalog
    /// is re-fetched when everything else is present.
    pub async fn prepare_resources(&self) -> Result<()> {
        self.layout.ensure_directories().await?;

        if self.config.clear_cache_on_start && !self.cache_cleared.swap(true, Ordering::SeqCst) {
            if let Err(e) = self.cache.clear_all().await {
                warn!("Failed to clear render cache: {}", e);
            }
        }

        self.acquirer.prepare().await
    }

    /// Sticker by id, or a random one; `None` when nothing matches
    pub fn select_sticker(&self, id: Option<&str>) -> Option<StickerDescriptor> {
        self.catalog.snapshot().select(id).cloned()
    }

    /// Like [`Self::select_sticker`], telling an unknown id apart from an
    /// empty catalog
    pub fn pick_sticker(&self, id: Option<&str>) -> Result<StickerDescriptor> {
        let catalog = self.catalog.snapshot();
        match (catalog.select(id), id) {
            (Some(sticker), _) => Ok(sticker.clone()),
            (None, Some(id)) if !catalog.is_empty() => Err(StickerError::StickerNotFound(id.to_string())),
            (None, _) => Err(StickerError::NoStickersAvailable),
        }
    }

    /// Render one sticker; `text` replaces the default text when non-empty
    pub async fn render_sticker(
        &self,
        descriptor: &StickerDescriptor,
        text: Option<&str>,
        overrides: &PlacementOverrides,
    ) -> Result<Vec<u8>> {
        let params = self.renderer.build_parameters(descriptor, text, overrides)?;
        self.renderer.render_sticker(&params).await
    }

    /// One tile per character
    pub async fn render_all_characters_grid(&self) -> Result<Vec<u8>> {
        let catalog = self.catalog.snapshot();
        self.renderer
            .render_catalog_grid(&catalog, None)
            .await?
            .ok_or(StickerError::NoStickersAvailable)
    }

    /// Every sticker of one character, `None` when the character is unknown
    pub async fn render_character_grid(&self, character: &str) -> Result<Option<Vec<u8>>> {
        let catalog = self.catalog.snapshot();
        self.renderer.render_catalog_grid(&catalog, Some(character)).await
    }

    /// Usage panel
    pub async fn render_help(&self) -> Result<Vec<u8>> {
        self.renderer.render_help(HELP_TEXT).await
    }

    /// Close the render session and the HTTP client. Both are recreated on
    /// next use.
    pub async fn shutdown(&self) {
        self.renderer.session().close().await;
        self.fetcher.close().await;
        info!("Sticker service shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::sample_catalog_json;
    use crate::catalog::Catalog;
    use crate::errors::ErrorStage;
    use crate::net::fetcher::tests::ScriptedTransport;
    use crate::render::NoEngine;
    use tempfile::TempDir;

    fn service(temp: &TempDir) -> StickerService {
        let config = StickerConfig {
            data_dir: Some(temp.path().join("data")),
            bundled_dir: Some(temp.path().join("bundled")),
            ..StickerConfig::default()
        };
        StickerService::with_transport(config, Arc::new(ScriptedTransport::default()), Arc::new(NoEngine)).unwrap()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = StickerConfig {
            request_timeout_secs: 0,
            ..StickerConfig::default()
        };
        let result = StickerService::with_transport(config, Arc::new(ScriptedTransport::default()), Arc::new(NoEngine));
        assert!(matches!(result, Err(StickerError::Configuration(_))));
    }

    #[test]
    fn test_pick_sticker_outcomes() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp);

        assert!(matches!(service.pick_sticker(None), Err(StickerError::NoStickersAvailable)));
        assert!(matches!(service.pick_sticker(Some("1")), Err(StickerError::NoStickersAvailable)));
        assert!(service.select_sticker(None).is_none());

        service
            .catalog()
            .replace(Catalog::from_json(&sample_catalog_json()).unwrap());

        assert_eq!(service.pick_sticker(Some("2")).unwrap().name, "Miku 01");
        assert!(matches!(
            service.pick_sticker(Some("99")),
            Err(StickerError::StickerNotFound(id)) if id == "99"
        ));
        assert!(service.select_sticker(None).is_some());
        // a blank id picks at random
        assert!(service.pick_sticker(Some("")).is_ok());
    }

    #[tokio::test]
    async fn test_render_without_engine_is_render_error() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp);
        service
            .catalog()
            .replace(Catalog::from_json(&sample_catalog_json()).unwrap());

        let sticker = service.pick_sticker(Some("1")).unwrap();
        let err = service
            .render_sticker(&sticker, None, &PlacementOverrides::default())
            .await
            .unwrap_err();
        assert_eq!(err.stage(), ErrorStage::Render);
    }
}
