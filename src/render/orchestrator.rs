//! Render orchestration: parameters, cache check, capture, write-through

use std::sync::Arc;

use futures::future::join_all;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use tracing::{debug, info};

use crate::cache::ContentCache;
use crate::catalog::{Catalog, StickerDescriptor};
use crate::errors::{Result, StickerError};
use crate::layout::DataLayout;
use crate::render::engine::CaptureOptions;
use crate::render::params::{PlacementOverrides, RenderParameters};
use crate::render::session::RenderSession;
use crate::render::templates::{sticker_grid, sticker_svg, text_panel, STICKER_SELECTOR, WRAPPER_SELECTOR};

/// Cache key of the one-tile-per-character grid
pub const ALL_CHARACTERS_KEY: &str = "all_characters";

/// Cache key of the help panel
pub const HELP_KEY: &str = "help";

/// Cache key of a single character's grid
pub fn character_grid_key(character: &str) -> String {
    format!(
        "grid_{}",
        utf8_percent_encode(&character.to_lowercase(), NON_ALPHANUMERIC)
    )
}

/// Turns parameters and catalog selections into images
#[derive(Debug, Clone)]
pub struct StickerRenderer {
    session: Arc<RenderSession>,
    cache: ContentCache,
    layout: DataLayout,
}

impl StickerRenderer {
    pub fn new(session: Arc<RenderSession>, cache: ContentCache, layout: DataLayout) -> Self {
        Self { session, cache, layout }
    }

    pub fn session(&self) -> &Arc<RenderSession> {
        &self.session
    }

    fn image_url(&self, descriptor: &StickerDescriptor) -> String {
        self.session
            .router()
            .to_virtual_url(&self.layout.sticker_image_path(&descriptor.image))
    }

    fn font_url(&self) -> String {
        self.session.router().to_virtual_url(&self.layout.font_path())
    }

    /// Resolve overrides against the descriptor and global defaults
    pub fn build_parameters(
        &self,
        descriptor: &StickerDescriptor,
        text: Option<&str>,
        overrides: &PlacementOverrides,
    ) -> Result<RenderParameters> {
        RenderParameters::build(descriptor, text, overrides, self.image_url(descriptor), self.font_url())
    }

    /// Render one sticker as a transparent PNG, served from cache when possible
    pub async fn render_sticker(&self, params: &RenderParameters) -> Result<Vec<u8>> {
        let options = CaptureOptions::transparent_png();
        let key = params.fingerprint();
        let ext = options.format.extension();

        if let Some(cached) = self.cache.get(&key, ext).await {
            return Ok(cached);
        }

        let image = self
            .session
            .capture(&sticker_svg(params), STICKER_SELECTOR, options)
            .await?;
        self.cache.put(&key, ext, &image).await;
        Ok(image)
    }

    /// Render a grid of the catalog.
    ///
    /// Without a filter there is one tile per character, labelled with the
    /// character name. With a filter every sticker of that character gets a
    /// tile labelled with its id. Returns `None` when nothing matches.
    pub async fn render_catalog_grid(&self, catalog: &Catalog, filter: Option<&str>) -> Result<Option<Vec<u8>>> {
        let (key, tiles): (String, Vec<(String, &StickerDescriptor)>) = match filter {
            None => (ALL_CHARACTERS_KEY.to_string(), catalog.first_per_character()),
            Some(character) => (
                character_grid_key(character),
                catalog
                    .by_character(character)
                    .into_iter()
                    .map(|s| (s.id.clone(), s))
                    .collect(),
            ),
        };

        if tiles.is_empty() {
            debug!("No stickers match grid filter {:?}", filter);
            return Ok(None);
        }

        let options = CaptureOptions::opaque_jpeg();
        let ext = options.format.extension();
        if let Some(cached) = self.cache.get(&key, ext).await {
            return Ok(Some(cached));
        }

        let fragments = join_all(
            tiles
                .iter()
                .map(|(label, descriptor)| self.tile_fragment(descriptor, label)),
        )
        .await
        .into_iter()
        .collect::<Result<Vec<String>>>()?;

        info!("Rendering grid {} with {} tile(s)", key, fragments.len());
        let image = self
            .session
            .capture(&sticker_grid(&fragments), WRAPPER_SELECTOR, options)
            .await?;
        self.cache.put(&key, ext, &image).await;
        Ok(Some(image))
    }

    async fn tile_fragment(&self, descriptor: &StickerDescriptor, label: &str) -> Result<String> {
        let path = self.layout.sticker_image_path(&descriptor.image);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StickerError::Render(format!(
                "image of sticker {} is missing: {}",
                descriptor.id,
                path.display()
            )));
        }

        let params = RenderParameters::for_tile(descriptor, label, self.image_url(descriptor), self.font_url());
        Ok(sticker_svg(&params))
    }

    /// Render a plain-text panel as JPEG under the fixed help key
    pub async fn render_help(&self, text: &str) -> Result<Vec<u8>> {
        let options = CaptureOptions::opaque_jpeg();
        let ext = options.format.extension();

        if let Some(cached) = self.cache.get(HELP_KEY, ext).await {
            return Ok(cached);
        }

        let image = self
            .session
            .capture(&text_panel(text, &self.font_url()), WRAPPER_SELECTOR, options)
            .await?;
        self.cache.put(HELP_KEY, ext, &image).await;
        Ok(image)
    }
}
