//! # Sekai Stickers
//!
//! Renders Project Sekai stickers: downloads the sticker catalog, images and
//! font from ordered mirror lists, turns sticker parameters into markup,
//! captures it through a persistent headless render session and caches the
//! result under a fingerprint of the parameters.

pub mod assets;
pub mod cache;
pub mod catalog;
pub mod config;
mod east_asian_width;
pub mod errors;
pub mod layout;
pub mod net;
pub mod render;
pub mod service;
pub mod text_fit;

pub use catalog::{Catalog, StickerDescriptor};
pub use config::StickerConfig;
pub use errors::{ErrorStage, Result, StickerError};
pub use render::{PlacementOverrides, RenderParameters};
pub use service::{StickerService, HELP_TEXT};
