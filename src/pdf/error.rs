//! Error types for the rendering backend, the pixel codec and the page cache

use std::path::PathBuf;

/// Errors from the rendering backend
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("cannot open {path:?}: {detail}")]
    Open { path: PathBuf, detail: String },

    #[error("page {0} does not exist")]
    NoSuchPage(usize),

    #[error("render thread is gone")]
    Disconnected,

    #[cfg(feature = "pdf")]
    #[error("PDF engine: {0}")]
    Pdf(#[from] mupdf::error::Error),

    #[error("{detail}")]
    Generic { detail: String },
}

impl BackendError {
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic { detail: msg.into() }
    }
}

/// Errors from the pixel codec
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("zlib stream: {0}")]
    Io(#[from] std::io::Error),

    #[error("inflated to {actual} bytes, expected {expected}")]
    LengthMismatch { expected: usize, actual: usize },
}

/// Errors surfaced by the page cache
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("failed to open document: {0}")]
    DocumentOpen(#[source] BackendError),

    #[error("invalid render height {0}")]
    InvalidScale(f64),

    #[error("page {index} out of range (document has {page_count} pages)")]
    OutOfRange { index: usize, page_count: usize },

    #[error("failed to render page {page}: {source}")]
    Render {
        page: usize,
        #[source]
        source: BackendError,
    },

    #[error("failed to decode cached page {page}: {source}")]
    Decode {
        page: usize,
        #[source]
        source: CodecError,
    },

    #[error("failed to compress page {page}: {source}")]
    Compress {
        page: usize,
        #[source]
        source: CodecError,
    },

    #[error("page {page} is unavailable for this session")]
    Unavailable { page: usize },
}

impl CacheError {
    /// Per-page failures leave the cache usable; everything else is fatal
    /// for the document.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Render { .. } | Self::Decode { .. } | Self::Compress { .. }
        )
    }
}
