//! Virtual origin router
//!
//! Pages are loaded from a synthetic origin so markup can reference assets
//! with ordinary URLs. Requests against the origin are answered from local
//! storage; nothing reaches the network.
//!
//! ```text
//! https://pjsk.local/                 -> empty document
//! https://pjsk.local/plugin/<path>    -> <bundled root>/<path>
//! https://pjsk.local/<path>           -> <data root>/<path>
//! anything else                       -> aborted
//! ```

use std::path::{Component, Path, PathBuf};

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use tracing::debug;

use crate::layout::DataLayout;

/// Synthetic origin every render page is loaded from
pub const VIRTUAL_ORIGIN: &str = "https://pjsk.local/";

/// Path prefix reserved for bundled resources
pub const BUNDLED_PREFIX: &str = "plugin/";

/// Document served for the origin root
pub const EMPTY_DOCUMENT: &str = "<html></html>";

/// Characters escaped inside a single path segment
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'\\')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Where a virtual URL points
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteTarget {
    Root,
    File(PathBuf),
}

/// Answer for an intercepted request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteResponse {
    Document(&'static str),
    Body { data: Vec<u8>, content_type: String },
    Abort,
}

/// Maps local paths to virtual URLs and back
#[derive(Debug, Clone)]
pub struct VirtualRouter {
    data_root: PathBuf,
    bundled_root: PathBuf,
}

impl VirtualRouter {
    pub fn new(layout: &DataLayout) -> Self {
        Self {
            data_root: layout.data_root().to_path_buf(),
            bundled_root: layout.bundled_root().to_path_buf(),
        }
    }

    /// Virtual URL for a local path.
    ///
    /// Paths outside both roots map to a filename-only URL, which the router
    /// will generally not be able to serve.
    pub fn to_virtual_url(&self, path: &Path) -> String {
        if let Ok(relative) = path.strip_prefix(&self.bundled_root) {
            return format!("{VIRTUAL_ORIGIN}{BUNDLED_PREFIX}{}", encode_relative(relative));
        }

        if let Ok(relative) = path.strip_prefix(&self.data_root) {
            return format!("{VIRTUAL_ORIGIN}{}", encode_relative(relative));
        }

        let name = path
            .file_name()
            .map(|n| utf8_percent_encode(&n.to_string_lossy(), SEGMENT).to_string())
            .unwrap_or_default();
        format!("{VIRTUAL_ORIGIN}{name}")
    }

    /// Local target of a virtual URL, `None` when it must not be served
    pub fn route(&self, url: &str) -> Option<RouteTarget> {
        let rest = url
            .strip_prefix(VIRTUAL_ORIGIN)
            .or_else(|| (url == VIRTUAL_ORIGIN.trim_end_matches('/')).then_some(""))?;
        let rest = rest.split(|c: char| c == '?' || c == '#').next().unwrap_or_default();

        if rest.is_empty() {
            return Some(RouteTarget::Root);
        }

        let decoded = percent_decode_str(rest).decode_utf8().ok()?;
        let (root, relative) = match decoded.strip_prefix(BUNDLED_PREFIX) {
            Some(relative) => (&self.bundled_root, relative),
            None => (&self.data_root, decoded.as_ref()),
        };

        let relative = Path::new(relative);
        let contained = relative.components().next().is_some()
            && relative.components().all(|c| matches!(c, Component::Normal(_)));
        contained.then(|| RouteTarget::File(root.join(relative)))
    }

    /// Resolve an intercepted request
    pub async fn resolve(&self, url: &str) -> RouteResponse {
        match self.route(url) {
            Some(RouteTarget::Root) => RouteResponse::Document(EMPTY_DOCUMENT),
            Some(RouteTarget::File(path)) => match tokio::fs::read(&path).await {
                Ok(data) => RouteResponse::Body {
                    content_type: mime_guess::from_path(&path).first_or_octet_stream().to_string(),
                    data,
                },
                Err(e) => {
                    debug!("Aborting {}: {}", url, e);
                    RouteResponse::Abort
                }
            },
            None => {
                debug!("Aborting request outside the virtual origin: {}", url);
                RouteResponse::Abort
            }
        }
    }
}

fn encode_relative(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(segment) => Some(utf8_percent_encode(&segment.to_string_lossy(), SEGMENT).to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
