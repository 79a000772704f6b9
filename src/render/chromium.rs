//! Headless Chromium backend over the DevTools protocol

use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::dom::Rgba;
use chromiumoxide::cdp::browser_protocol::emulation::SetDefaultBackgroundColorOverrideParams;
use chromiumoxide::cdp::browser_protocol::fetch::{
    EnableParams, EventRequestPaused, FailRequestParams, FulfillRequestParams, HeaderEntry, RequestPattern,
};
use chromiumoxide::cdp::browser_protocol::network::ErrorReason;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::cdp::browser_protocol::target::{CreateBrowserContextParams, CreateTargetParams};
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::errors::{Result, StickerError};
use crate::render::engine::{BrowsingContext, CaptureOptions, Engine, EngineLauncher, ImageFormat, RenderPage};
use crate::render::router::{RouteResponse, VirtualRouter};

/// Upper bound for a selector to appear
const SELECTOR_TIMEOUT: Duration = Duration::from_secs(30);

const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(50);

fn render_error(e: impl Display) -> StickerError {
    StickerError::Render(e.to_string())
}

/// Launches a local headless Chromium
#[derive(Debug, Default, Clone)]
pub struct ChromiumLauncher;

#[async_trait]
impl EngineLauncher for ChromiumLauncher {
    async fn launch(&self) -> Result<Arc<dyn Engine>> {
        let config = BrowserConfig::builder().build().map_err(render_error)?;
        let (browser, mut handler) = Browser::launch(config).await.map_err(render_error)?;

        let connected = Arc::new(AtomicBool::new(true));
        let handler_connected = Arc::clone(&connected);
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler stopped: {}", e);
                    break;
                }
            }
            handler_connected.store(false, Ordering::SeqCst);
        });

        Ok(Arc::new(ChromiumEngine {
            browser: Arc::new(Mutex::new(browser)),
            connected,
            handler_task,
        }))
    }
}

struct ChromiumEngine {
    browser: Arc<Mutex<Browser>>,
    connected: Arc<AtomicBool>,
    handler_task: JoinHandle<()>,
}

#[async_trait]
impl Engine for ChromiumEngine {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && !self.handler_task.is_finished()
    }

    async fn new_context(&self) -> Result<Arc<dyn BrowsingContext>> {
        let id = self
            .browser
            .lock()
            .await
            .create_browser_context(CreateBrowserContextParams::default())
            .await
            .map_err(render_error)?;

        Ok(Arc::new(ChromiumContext {
            browser: Arc::clone(&self.browser),
            id,
        }))
    }

    async fn close(&self) -> Result<()> {
        let mut browser = self.browser.lock().await;
        let closed = browser.close().await.map(|_| ()).map_err(render_error);
        if let Err(e) = browser.wait().await {
            debug!("Waiting for browser exit failed: {}", e);
        }
        self.connected.store(false, Ordering::SeqCst);
        self.handler_task.abort();
        closed
    }
}

struct ChromiumContext {
    browser: Arc<Mutex<Browser>>,
    id: BrowserContextId,
}

#[async_trait]
impl BrowsingContext for ChromiumContext {
    async fn new_page(&self) -> Result<Box<dyn RenderPage>> {
        let params = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(self.id.clone())
            .build()
            .map_err(render_error)?;
        let page = self.browser.lock().await.new_page(params).await.map_err(render_error)?;

        Ok(Box::new(ChromiumPage {
            page: Some(page),
            interceptor: None,
        }))
    }

    async fn close(&self) -> Result<()> {
        self.browser
            .lock()
            .await
            .dispose_browser_context(self.id.clone())
            .await
            .map_err(render_error)
    }
}

struct ChromiumPage {
    page: Option<Page>,
    interceptor: Option<JoinHandle<()>>,
}

impl ChromiumPage {
    fn page(&self) -> Result<&Page> {
        self.page
            .as_ref()
            .ok_or_else(|| StickerError::Render("page already closed".to_string()))
    }
}

/// Answer one paused request from the router
async fn answer(page: &Page, router: &VirtualRouter, event: &EventRequestPaused) -> Result<()> {
    let request_id = event.request_id.clone();

    let (body, content_type) = match router.resolve(&event.request.url).await {
        RouteResponse::Document(html) => (html.as_bytes().to_vec(), "text/html".to_string()),
        RouteResponse::Body { data, content_type } => (data, content_type),
        RouteResponse::Abort => {
            page.execute(FailRequestParams::new(request_id, ErrorReason::BlockedByClient))
                .await
                .map_err(render_error)?;
            return Ok(());
        }
    };

    let fulfill = FulfillRequestParams::builder()
        .request_id(request_id)
        .response_code(200)
        .response_header(HeaderEntry::new("Content-Type", content_type))
        .body(base64::engine::general_purpose::STANDARD.encode(body))
        .build()
        .map_err(render_error)?;
    page.execute(fulfill).await.map_err(render_error)?;
    Ok(())
}

#[async_trait]
impl RenderPage for ChromiumPage {
    async fn route(&mut self, router: Arc<VirtualRouter>) -> Result<()> {
        let page = self.page()?.clone();

        let mut paused = page
            .event_listener::<EventRequestPaused>()
            .await
            .map_err(render_error)?;
        let listener_page = page.clone();
        self.interceptor = Some(tokio::spawn(async move {
            while let Some(event) = paused.next().await {
                if let Err(e) = answer(&listener_page, &router, &event).await {
                    warn!("Failed to answer intercepted request {}: {}", event.request.url, e);
                }
            }
        }));

        let enable = EnableParams::builder()
            .pattern(RequestPattern::builder().url_pattern("*").build())
            .build();
        page.execute(enable).await.map_err(render_error)?;
        Ok(())
    }

    async fn goto(&mut self, url: &str) -> Result<()> {
        self.page()?.goto(url).await.map_err(render_error)?;
        Ok(())
    }

    async fn set_content(&mut self, markup: &str) -> Result<()> {
        self.page()?.set_content(markup).await.map_err(render_error)?;
        Ok(())
    }

    async fn wait_for_selector(&mut self, selector: &str) -> Result<()> {
        let page = self.page()?;
        let found = tokio::time::timeout(SELECTOR_TIMEOUT, async {
            while page.find_element(selector).await.is_err() {
                tokio::time::sleep(SELECTOR_POLL_INTERVAL).await;
            }
        })
        .await;

        found.map_err(|_| StickerError::Render(format!("element `{selector}` did not appear")))
    }

    async fn capture_element(&mut self, selector: &str, options: CaptureOptions) -> Result<Vec<u8>> {
        let page = self.page()?;

        if options.omit_background {
            let transparent = SetDefaultBackgroundColorOverrideParams::builder()
                .color(Rgba {
                    r: 0,
                    g: 0,
                    b: 0,
                    a: Some(0.0),
                })
                .build();
            page.execute(transparent).await.map_err(render_error)?;
        }

        let format = match options.format {
            ImageFormat::Png => CaptureScreenshotFormat::Png,
            ImageFormat::Jpeg => CaptureScreenshotFormat::Jpeg,
        };

        let element = page.find_element(selector).await.map_err(render_error)?;
        element.screenshot(format).await.map_err(render_error)
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(interceptor) = self.interceptor.take() {
            interceptor.abort();
        }
        match self.page.take() {
            Some(page) => page.close().await.map_err(render_error),
            None => Ok(()),
        }
    }
}
