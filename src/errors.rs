use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while preparing resources or rendering stickers
#[derive(Error, Debug)]
pub enum StickerError {
    /// Every mirror was tried and the last attempt failed
    #[error("All sources exhausted, last attempt {url} failed: {message}")]
    SourceUnavailable { url: String, message: String },

    /// A fetch was requested with an empty mirror list
    #[error("No source URL specified")]
    NoSourceUrls,

    /// A caller-supplied override could not be read as a number
    #[error("Failed to resolve parameter value `{0}`")]
    ParameterResolution(String),

    /// The render engine failed to produce an image
    #[error("Render failed: {0}")]
    Render(String),

    /// The sticker catalog could not be parsed or is empty
    #[error("Invalid sticker catalog: {0}")]
    Catalog(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No sticker with the requested id
    #[error("No sticker with id {0}")]
    StickerNotFound(String),

    /// The catalog is empty, nothing to pick from
    #[error("No stickers available, check that resources finished downloading")]
    NoStickersAvailable,

    /// Error when writing a downloaded asset to disk
    #[error("Failed to write {path}: {message}")]
    FileWrite { path: PathBuf, message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stage of the pipeline an error belongs to, used by the boundary layer
/// to tell the user what went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorStage {
    Prepare,
    Selection,
    Parameters,
    Render,
}

impl ErrorStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prepare => "resource preparation",
            Self::Selection => "sticker selection",
            Self::Parameters => "parameter parsing",
            Self::Render => "rendering",
        }
    }
}

impl std::fmt::Display for ErrorStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl StickerError {
    /// The pipeline stage this error originates from
    pub fn stage(&self) -> ErrorStage {
        match self {
            Self::SourceUnavailable { .. }
            | Self::NoSourceUrls
            | Self::Catalog(_)
            | Self::Configuration(_)
            | Self::FileWrite { .. }
            | Self::Io(_) => ErrorStage::Prepare,
            Self::StickerNotFound(_) | Self::NoStickersAvailable => ErrorStage::Selection,
            Self::ParameterResolution(_) => ErrorStage::Parameters,
            Self::Render(_) => ErrorStage::Render,
        }
    }

    /// Message suitable for showing to an end user
    pub fn user_message(&self) -> String {
        match self {
            Self::ParameterResolution(raw) => format!("Failed to parse parameter value `{raw}`"),
            Self::StickerNotFound(id) => format!("No sticker found with id {id}"),
            Self::NoStickersAvailable => self.to_string(),
            _ => format!("Error during {}: {}", self.stage(), self),
        }
    }
}

/// Type alias for Result with StickerError
pub type Result<T> = std::result::Result<T, StickerError>;

impl From<serde_json::Error> for StickerError {
    fn from(error: serde_json::Error) -> Self {
        StickerError::Catalog(error.to_string())
    }
}
