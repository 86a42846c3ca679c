//! Page rendering and caching
//!
//! Pages are rendered once at a fixed height, compressed in the background
//! and decompressed on demand.

mod backend;
mod cache;
mod codec;
mod entry;
mod error;
#[cfg(feature = "pdf")]
mod mupdf_backend;
mod types;
mod worker;

pub use backend::DocumentBackend;
pub use cache::PageCache;
pub use codec::{CompressedPixmap, PixelCodec};
pub use entry::{Health, PageState};
pub use error::{BackendError, CacheError, CodecError};
#[cfg(feature = "pdf")]
pub use mupdf_backend::MupdfBackend;
pub use types::*;

pub(crate) use cache::lock;
