//! Configuration for sticker rendering and asset mirrors

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, StickerError};

/// Sticker catalog and image mirrors
pub const DEFAULT_ASSETS_MIRRORS: &[&str] =
    &["https://raw.githubusercontent.com/TheOriginalAyaka/sekai-stickers/main/"];

/// Mirrors of the plugin repository, used as the font source
pub const DEFAULT_REPO_MIRRORS: &[&str] =
    &["https://raw.githubusercontent.com/Agnes4m/nonebot_plugin_pjsk/main/"];

/// Proxy environment variables, checked in order
const PROXY_VARS: &[&str] = &[
    "HTTPS_PROXY",
    "https_proxy",
    "HTTP_PROXY",
    "http_proxy",
    "ALL_PROXY",
    "all_proxy",
];

/// Configuration for the sticker service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StickerConfig {
    /// Extra attempts per mirror URL before moving to the next one
    pub request_retries: u32,
    /// Request timeout in seconds
    pub request_timeout_secs: u64,
    /// Serve repeated renders from the on-disk cache
    pub use_cache: bool,
    /// Wipe the render cache once during startup
    pub clear_cache_on_start: bool,
    /// Mirrors for the catalog and sticker images
    pub assets_mirrors: Vec<String>,
    /// Mirrors for the plugin repository (font source)
    pub repo_mirrors: Vec<String>,
    /// Data root override
    pub data_dir: Option<PathBuf>,
    /// Directory holding bundled resources (fonts shipped with the binary)
    pub bundled_dir: Option<PathBuf>,
}

impl Default for StickerConfig {
    fn default() -> Self {
        Self {
            request_retries: 1,
            request_timeout_secs: 10,
            use_cache: true,
            clear_cache_on_start: false,
            assets_mirrors: DEFAULT_ASSETS_MIRRORS.iter().map(|s| (*s).to_string()).collect(),
            repo_mirrors: DEFAULT_REPO_MIRRORS.iter().map(|s| (*s).to_string()).collect(),
            data_dir: None,
            bundled_dir: None,
        }
    }
}

impl StickerConfig {
    fn project_dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("com", "sekai", "sekai-stickers")
    }

    /// Default path of the configuration file
    pub fn config_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Data root, honoring the override
    pub fn data_root(&self) -> PathBuf {
        self.data_dir
            .clone()
            .or_else(|| Self::project_dirs().map(|dirs| dirs.data_dir().to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("data").join("pjsk"))
    }

    /// Bundled resource root, honoring the override. Defaults to
    /// `resources/` next to the executable, then under the data directory.
    pub fn bundled_root(&self) -> PathBuf {
        self.bundled_dir.clone().unwrap_or_else(|| {
            env::current_exe()
                .ok()
                .and_then(|exe| exe.parent().map(Path::to_path_buf))
                .or_else(|| Self::project_dirs().map(|dirs| dirs.data_dir().to_path_buf()))
                .unwrap_or_default()
                .join("resources")
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Load configuration from a TOML or JSON file; a missing file yields defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .map_err(|e| StickerError::Configuration(format!("Failed to read config: {e}")))?;

        let config: Self = if path.extension().is_some_and(|e| e == "json") {
            serde_json::from_str(&content)
                .map_err(|e| StickerError::Configuration(format!("Invalid JSON config: {e}")))?
        } else {
            toml::from_str(&content)
                .map_err(|e| StickerError::Configuration(format!("Invalid TOML config: {e}")))?
        };

        config.validate()?;
        Ok(config)
    }

    /// Apply `SEKAI_STICKERS_*` environment overrides
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(retries) = env::var("SEKAI_STICKERS_RETRIES") {
            self.request_retries = retries.parse().unwrap_or(self.request_retries);
        }

        if let Ok(timeout) = env::var("SEKAI_STICKERS_TIMEOUT_SECONDS") {
            self.request_timeout_secs = timeout.parse().unwrap_or(self.request_timeout_secs);
        }

        if let Ok(use_cache) = env::var("SEKAI_STICKERS_USE_CACHE") {
            self.use_cache = parse_flag(&use_cache).unwrap_or(self.use_cache);
        }

        if let Ok(clear) = env::var("SEKAI_STICKERS_CLEAR_CACHE") {
            self.clear_cache_on_start = parse_flag(&clear).unwrap_or(self.clear_cache_on_start);
        }

        if let Ok(dir) = env::var("SEKAI_STICKERS_DATA_DIR") {
            self.data_dir = Some(PathBuf::from(dir));
        }

        if let Ok(dir) = env::var("SEKAI_STICKERS_BUNDLED_DIR") {
            self.bundled_dir = Some(PathBuf::from(dir));
        }

        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_secs == 0 {
            return Err(StickerError::Configuration(
                "Timeout must be greater than 0".to_string(),
            ));
        }

        if self.assets_mirrors.is_empty() {
            return Err(StickerError::Configuration(
                "At least one assets mirror is required".to_string(),
            ));
        }

        if self.repo_mirrors.is_empty() {
            return Err(StickerError::Configuration(
                "At least one repository mirror is required".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Outbound proxy from the environment.
///
/// Read on every call so that proxy changes made by the host process after
/// startup are picked up without a restart.
pub fn proxy_from_env() -> Option<String> {
    PROXY_VARS
        .iter()
        .filter_map(|var| env::var(var).ok())
        .find(|value| !value.is_empty())
}

/// Append a path suffix to every mirror prefix
pub fn with_prefixes(suffix: &str, prefixes: &[String]) -> Vec<String> {
    prefixes.iter().map(|prefix| format!("{prefix}{suffix}")).collect()
}
