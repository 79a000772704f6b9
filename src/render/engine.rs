//! Rendering engine seam
//!
//! The session drives any engine that can open pages, route their requests
//! through a [`VirtualRouter`] and capture an element. A Chromium backend is
//! available behind the `chromium` feature.

use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::{Result, StickerError};
use crate::render::router::VirtualRouter;

/// Raster format of a capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
}

impl ImageFormat {
    /// File extension used for cache entries
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
        }
    }
}

/// What to capture and how
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureOptions {
    pub format: ImageFormat,
    /// Leave the page background transparent
    pub omit_background: bool,
}

impl CaptureOptions {
    /// Transparent PNG, used for single stickers
    pub fn transparent_png() -> Self {
        Self {
            format: ImageFormat::Png,
            omit_background: true,
        }
    }

    /// JPEG keeping the page background, used for grids and panels
    pub fn opaque_jpeg() -> Self {
        Self {
            format: ImageFormat::Jpeg,
            omit_background: false,
        }
    }
}

/// Starts a rendering engine
#[async_trait]
pub trait EngineLauncher: Send + Sync {
    async fn launch(&self) -> Result<Arc<dyn Engine>>;
}

/// A running rendering engine
#[async_trait]
pub trait Engine: Send + Sync {
    /// False once the engine process has gone away
    fn is_connected(&self) -> bool;

    async fn new_context(&self) -> Result<Arc<dyn BrowsingContext>>;

    async fn close(&self) -> Result<()>;
}

/// Browsing context pages are opened in
#[async_trait]
pub trait BrowsingContext: Send + Sync {
    async fn new_page(&self) -> Result<Box<dyn RenderPage>>;

    async fn close(&self) -> Result<()>;
}

/// A single page, used for exactly one capture
#[async_trait]
pub trait RenderPage: Send {
    /// Answer every request of this page through `router`
    async fn route(&mut self, router: Arc<VirtualRouter>) -> Result<()>;

    async fn goto(&mut self, url: &str) -> Result<()>;

    async fn set_content(&mut self, markup: &str) -> Result<()>;

    /// Wait until an element matching `selector` exists
    async fn wait_for_selector(&mut self, selector: &str) -> Result<()>;

    /// Capture the first element matching `selector`
    async fn capture_element(&mut self, selector: &str, options: CaptureOptions) -> Result<Vec<u8>>;

    async fn close(&mut self) -> Result<()>;
}

/// Launcher for builds without a rendering backend
#[derive(Debug, Default, Clone, Copy)]
pub struct NoEngine;

#[async_trait]
impl EngineLauncher for NoEngine {
    async fn launch(&self) -> Result<Arc<dyn Engine>> {
        Err(StickerError::Render(
            "no rendering engine available, rebuild with the `chromium` feature".to_string(),
        ))
    }
}
