//! Rendering backend seam
//!
//! The page cache never talks to a PDF engine directly. Everything it needs
//! from a document goes through [`DocumentBackend`], and every call is made
//! while holding the cache's renderer lock, so implementations do not have to
//! be reentrant.

use super::error::BackendError;
use super::types::{Destination, LinkMapping, OutlineLabel, Pixmap};

pub trait DocumentBackend: Send {
    fn page_count(&self) -> usize;

    /// Page size in document units (width, height)
    fn page_natural_size(&self, index: usize) -> Result<(f64, f64), BackendError>;

    /// Rasterize page `index` at `scale` onto an opaque white RGBA raster.
    fn render(&self, index: usize, scale: f64) -> Result<Pixmap, BackendError>;

    /// Clickable areas of page `index`, in document units
    fn link_mapping(&self, index: usize) -> Result<Vec<LinkMapping>, BackendError>;

    fn find_named_destination(&self, name: &str) -> Option<Destination>;

    /// Flattened outline, in document order
    fn outline_labels(&self) -> Vec<OutlineLabel>;
}
