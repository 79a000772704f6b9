//! Shared fakes for integration tests: a scripted HTTP transport and an
//! in-memory render engine that answers page requests through the router.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tempfile::TempDir;

use sekai_stickers::errors::{Result, StickerError};
use sekai_stickers::net::{FetchError, HttpTransport};
use sekai_stickers::render::engine::{BrowsingContext, CaptureOptions, Engine, EngineLauncher, RenderPage};
use sekai_stickers::render::router::{RouteResponse, VirtualRouter, VIRTUAL_ORIGIN};
use sekai_stickers::StickerConfig;

pub const ASSETS: &str = "https://assets.example/";
pub const REPO: &str = "https://repo.example/";

/// Transport answering from per-URL queues; unscripted URLs get a 404
#[derive(Default)]
pub struct FakeTransport {
    scripts: Mutex<HashMap<String, VecDeque<std::result::Result<Bytes, FetchError>>>>,
    pub requests: Mutex<Vec<String>>,
    pub closed: AtomicUsize,
}

impl FakeTransport {
    pub fn respond(&self, url: &str, response: std::result::Result<&[u8], FetchError>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(response.map(Bytes::copy_from_slice));
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for FakeTransport {
    async fn get(&self, url: &str) -> std::result::Result<Bytes, FetchError> {
        self.requests.lock().unwrap().push(url.to_string());
        self.scripts
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Err(FetchError::Status(404)))
    }

    async fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn descriptor_json(name: &str, character: &str, img: &str) -> String {
    format!(
        r##"{{"name":"{name}","character":"{character}","img":"{img}","color":"#ee1166",
        "defaultText":{{"text":"{name}","x":148,"y":58,"r":-2,"s":47}}}}"##
    )
}

/// Three stickers: `Miku`, `ena`, `Miku`, in that upstream order
pub fn catalog_json() -> String {
    format!(
        "[{},{},{}]",
        descriptor_json("Miku 01", "Miku", "miku/Miku_01.png"),
        descriptor_json("Ena 01", "ena", "ena/Ena_01.png"),
        descriptor_json("Miku 02", "Miku", "miku/Miku_02.png"),
    )
}

pub const IMAGES: [&str; 3] = ["ena/Ena_01.png", "miku/Miku_01.png", "miku/Miku_02.png"];

/// Script one successful `prepare` against the default test mirrors
pub fn script_mirrors(transport: &FakeTransport) {
    let catalog = catalog_json();
    transport.respond(&format!("{ASSETS}src/characters.json"), Ok(catalog.as_bytes()));
    transport.respond(&format!("{REPO}fonts/YurukaFangTang.ttf"), Ok(b"font-bytes"));
    for image in IMAGES {
        transport.respond(&format!("{ASSETS}public/img/{image}"), Ok(image.as_bytes()));
    }
}

pub fn config(temp: &TempDir) -> StickerConfig {
    StickerConfig {
        request_retries: 0,
        assets_mirrors: vec![ASSETS.to_string()],
        repo_mirrors: vec![REPO.to_string()],
        data_dir: Some(temp.path().join("data")),
        bundled_dir: Some(temp.path().join("bundled")),
        ..StickerConfig::default()
    }
}

#[derive(Debug, Default)]
pub struct EngineStats {
    pub launches: AtomicUsize,
    pub pages_opened: AtomicUsize,
    pub pages_closed: AtomicUsize,
    pub captures: AtomicUsize,
    pub connected: AtomicBool,
    /// Every virtual URL referenced by captured markup, with whether the
    /// router could serve it
    pub resolved: Mutex<Vec<(String, bool)>>,
}

impl EngineStats {
    pub fn captures(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }
}

/// Engine whose capture output is the page markup
#[derive(Debug, Clone, Default)]
pub struct FakeLauncher {
    pub stats: Arc<EngineStats>,
}

struct FakeEngine(Arc<EngineStats>);

struct FakeContext(Arc<EngineStats>);

struct FakePage {
    stats: Arc<EngineStats>,
    router: Option<Arc<VirtualRouter>>,
    markup: String,
}

#[async_trait]
impl EngineLauncher for FakeLauncher {
    async fn launch(&self) -> Result<Arc<dyn Engine>> {
        self.stats.launches.fetch_add(1, Ordering::SeqCst);
        self.stats.connected.store(true, Ordering::SeqCst);
        Ok(Arc::new(FakeEngine(Arc::clone(&self.stats))))
    }
}

#[async_trait]
impl Engine for FakeEngine {
    fn is_connected(&self) -> bool {
        self.0.connected.load(Ordering::SeqCst)
    }

    async fn new_context(&self) -> Result<Arc<dyn BrowsingContext>> {
        Ok(Arc::new(FakeContext(Arc::clone(&self.0))))
    }

    async fn close(&self) -> Result<()> {
        self.0.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl BrowsingContext for FakeContext {
    async fn new_page(&self) -> Result<Box<dyn RenderPage>> {
        self.0.pages_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakePage {
            stats: Arc::clone(&self.0),
            router: None,
            markup: String::new(),
        }))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Quoted virtual URLs in `markup`
fn virtual_urls(markup: &str) -> Vec<String> {
    let needle = format!("\"{VIRTUAL_ORIGIN}");
    markup
        .match_indices(&needle)
        .filter_map(|(start, _)| {
            let rest = &markup[start + 1..];
            rest.find('"').map(|end| rest[..end].to_string())
        })
        .collect()
}

#[async_trait]
impl RenderPage for FakePage {
    async fn route(&mut self, router: Arc<VirtualRouter>) -> Result<()> {
        self.router = Some(router);
        Ok(())
    }

    async fn goto(&mut self, url: &str) -> Result<()> {
        let router = self.router.as_ref().ok_or_else(|| StickerError::Render("no router".into()))?;
        match router.resolve(url).await {
            RouteResponse::Document(_) => Ok(()),
            other => Err(StickerError::Render(format!("unexpected root response {other:?}"))),
        }
    }

    async fn set_content(&mut self, markup: &str) -> Result<()> {
        self.markup = markup.to_string();
        Ok(())
    }

    async fn wait_for_selector(&mut self, _selector: &str) -> Result<()> {
        Ok(())
    }

    async fn capture_element(&mut self, _selector: &str, _options: CaptureOptions) -> Result<Vec<u8>> {
        let router = self.router.as_ref().ok_or_else(|| StickerError::Render("no router".into()))?;
        for url in virtual_urls(&self.markup) {
            let served = matches!(router.resolve(&url).await, RouteResponse::Body { .. });
            self.stats.resolved.lock().unwrap().push((url, served));
        }

        self.stats.captures.fetch_add(1, Ordering::SeqCst);
        Ok(self.markup.as_bytes().to_vec())
    }

    async fn close(&mut self) -> Result<()> {
        self.stats.pages_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
