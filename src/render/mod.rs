//! Rendering pipeline
//!
//! [`StickerRenderer`] turns parameters into markup, checks the content
//! cache and drives a [`RenderSession`] on a miss. The session talks to an
//! engine through the traits in [`engine`]; page requests are answered by
//! the [`VirtualRouter`].

#[cfg(feature = "chromium")]
pub mod chromium;
pub mod engine;
pub mod orchestrator;
pub mod params;
pub mod router;
pub mod session;
pub mod templates;

#[cfg(feature = "chromium")]
pub use chromium::ChromiumLauncher;
pub use engine::{CaptureOptions, EngineLauncher, ImageFormat, NoEngine};
pub use orchestrator::StickerRenderer;
pub use params::{resolve_value, PlacementOverrides, RenderParameters};
pub use router::VirtualRouter;
pub use session::RenderSession;
