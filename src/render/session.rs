//! Persistent render session
//!
//! One engine and one browsing context are created on first use and reused
//! for every capture. Each capture opens a fresh page that is always closed
//! afterwards. Creation, liveness checks and teardown are serialized by a
//! single lock; captures themselves run concurrently.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::render::engine::{BrowsingContext, CaptureOptions, Engine, EngineLauncher, RenderPage};
use crate::render::router::{VirtualRouter, VIRTUAL_ORIGIN};

#[derive(Default)]
struct SessionState {
    engine: Option<Arc<dyn Engine>>,
    context: Option<Arc<dyn BrowsingContext>>,
}

/// Long-lived rendering session
pub struct RenderSession {
    launcher: Arc<dyn EngineLauncher>,
    router: Arc<VirtualRouter>,
    state: Mutex<SessionState>,
}

impl std::fmt::Debug for RenderSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderSession")
            .field("router", &self.router)
            .finish_non_exhaustive()
    }
}

impl RenderSession {
    pub fn new(launcher: Arc<dyn EngineLauncher>, router: Arc<VirtualRouter>) -> Self {
        Self {
            launcher,
            router,
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn router(&self) -> &Arc<VirtualRouter> {
        &self.router
    }

    /// Current browsing context, (re)creating engine and context as needed
    async fn context(&self) -> Result<Arc<dyn BrowsingContext>> {
        let mut state = self.state.lock().await;

        if let Some(engine) = state.engine.as_ref() {
            if !engine.is_connected() {
                warn!("Render engine disconnected, recreating session");
                state.context = None;
                state.engine = None;
            }
        }

        if let Some(context) = state.context.as_ref() {
            return Ok(Arc::clone(context));
        }

        let engine = match state.engine.as_ref() {
            Some(engine) => Arc::clone(engine),
            None => {
                let engine = self.launcher.launch().await?;
                info!("Render engine launched");
                state.engine = Some(Arc::clone(&engine));
                engine
            }
        };

        let context = engine.new_context().await?;
        debug!("Browsing context created");
        state.context = Some(Arc::clone(&context));
        Ok(context)
    }

    /// Render `markup` on a fresh page and capture the element matching
    /// `selector`. The page is closed whether or not the capture succeeds.
    pub async fn capture(&self, markup: &str, selector: &str, options: CaptureOptions) -> Result<Vec<u8>> {
        let context = self.context().await?;
        let mut page = context.new_page().await?;

        let result = self.drive(page.as_mut(), markup, selector, options).await;

        if let Err(e) = page.close().await {
            debug!("Failed to close render page: {}", e);
        }
        result
    }

    async fn drive(
        &self,
        page: &mut dyn RenderPage,
        markup: &str,
        selector: &str,
        options: CaptureOptions,
    ) -> Result<Vec<u8>> {
        page.route(Arc::clone(&self.router)).await?;
        page.goto(VIRTUAL_ORIGIN).await?;
        page.set_content(markup).await?;
        page.wait_for_selector(selector).await?;
        page.capture_element(selector, options).await
    }

    /// Tear down context and engine; the next capture starts a new session
    pub async fn close(&self) {
        let mut state = self.state.lock().await;

        if let Some(context) = state.context.take() {
            if let Err(e) = context.close().await {
                debug!("Failed to close browsing context: {}", e);
            }
        }

        if let Some(engine) = state.engine.take() {
            if let Err(e) = engine.close().await {
                debug!("Failed to close render engine: {}", e);
            }
            info!("Render engine closed");
        }
    }
}
