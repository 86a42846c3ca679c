//! Page cache: turns a page index into a displayable raster
//!
//! Lock order, finest first: a page entry lock, then the renderer lock. The
//! link lock also wraps the renderer lock. The control lock is only held for
//! short scalar updates and never while taking another lock.

#[cfg(feature = "pdf")]
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use log::{debug, error, info, warn};

use super::backend::DocumentBackend;
use super::codec::CompressedPixmap;
use super::entry::{Health, PageEntry, PageState};
use super::error::{BackendError, CacheError};
use super::types::{
    Action, CacheStatus, Destination, LinkMapping, PageView, Pixmap, raster_size,
};
use super::worker;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scheduling state and statistics, guarded by the control lock
#[derive(Debug, Default)]
pub(crate) struct Control {
    pub current_index: usize,
    pub pages_cached: usize,
    pub caching_enabled: bool,
}

/// Link areas of the page last passed to `load_page`
#[derive(Debug)]
struct CurrentLinks {
    mappings: Vec<LinkMapping>,
    /// Raster pixels per document unit, for hit-testing
    scale: f64,
}

/// State shared between the foreground, the caching worker and the
/// overview prerenderer.
pub(crate) struct CacheCore {
    renderer: Mutex<Box<dyn DocumentBackend>>,
    pages: Box<[PageEntry]>,
    control: Mutex<Control>,
    links: Mutex<CurrentLinks>,
    scale_to_height: f64,
}

impl CacheCore {
    pub(crate) fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub(crate) fn control(&self) -> MutexGuard<'_, Control> {
        lock(&self.control)
    }

    fn entry(&self, index: usize) -> Result<&PageEntry, CacheError> {
        self.pages.get(index).ok_or(CacheError::OutOfRange {
            index,
            page_count: self.pages.len(),
        })
    }

    /// Render page `index` at the configured height. Caller holds the page lock.
    fn rasterize(&self, index: usize) -> Result<Pixmap, CacheError> {
        let render_error = |source| CacheError::Render {
            page: index,
            source,
        };

        let renderer = lock(&self.renderer);
        let natural = renderer.page_natural_size(index).map_err(render_error)?;
        let (scale, _, _) = raster_size(natural, self.scale_to_height);
        if scale <= 0.0 {
            return Err(render_error(BackendError::generic(format!(
                "page {index} has an empty media box"
            ))));
        }
        renderer.render(index, scale).map_err(render_error)
    }

    pub(crate) fn fetch_page(&self, index: usize) -> Result<PageView, CacheError> {
        let mut slot = self.entry(index)?.lock();

        if slot.health == Health::Unavailable {
            return Err(CacheError::Unavailable { page: index });
        }

        match std::mem::take(&mut slot.state) {
            PageState::Decoded(pixmap) => {
                slot.state = PageState::Decoded(Arc::clone(&pixmap));
                Ok(slot.view(pixmap))
            }

            PageState::DecodedAndCompressed(pixmap, compressed) => {
                slot.state = PageState::DecodedAndCompressed(Arc::clone(&pixmap), compressed);
                Ok(slot.view(pixmap))
            }

            PageState::Compressed(compressed) if slot.health == Health::Ok => {
                match compressed.decode() {
                    Ok(pixmap) => {
                        let pixmap = Arc::new(pixmap);
                        slot.state =
                            PageState::DecodedAndCompressed(Arc::clone(&pixmap), compressed);
                        Ok(slot.view(pixmap))
                    }
                    Err(source) => {
                        warn!("Cached page {index} does not decode, will re-render: {source}");
                        slot.state = PageState::Compressed(compressed);
                        slot.health = Health::CorruptCompressed;
                        Err(CacheError::Decode {
                            page: index,
                            source,
                        })
                    }
                }
            }

            // Compressed bytes are untrusted: go back to the document
            PageState::Compressed(compressed) => {
                slot.state = PageState::Rendering;
                match self.rasterize(index) {
                    Ok(pixmap) => {
                        slot.set_dimensions(&pixmap);
                        slot.worker_failed = false;
                        let pixmap = Arc::new(pixmap);
                        slot.state =
                            PageState::DecodedAndCompressed(Arc::clone(&pixmap), compressed);
                        Ok(slot.view(pixmap))
                    }
                    Err(e) => {
                        error!("Page {index} cannot be restored: {e}");
                        slot.state = PageState::Compressed(compressed);
                        slot.health = Health::Unavailable;
                        Err(e)
                    }
                }
            }

            PageState::Empty | PageState::Rendering => {
                slot.state = PageState::Rendering;
                match self.rasterize(index) {
                    Ok(pixmap) => {
                        slot.set_dimensions(&pixmap);
                        // The page renders again, so the worker may retry it
                        slot.worker_failed = false;
                        let pixmap = Arc::new(pixmap);
                        slot.state = PageState::Decoded(Arc::clone(&pixmap));
                        Ok(slot.view(pixmap))
                    }
                    Err(e) => {
                        slot.state = PageState::Empty;
                        Err(e)
                    }
                }
            }
        }
    }

    pub(crate) fn reference(&self, index: usize) -> Result<(), CacheError> {
        let mut slot = self.entry(index)?.lock();
        slot.ref_count = slot.ref_count.saturating_add(1);
        Ok(())
    }

    pub(crate) fn unref(&self, index: usize) -> Result<(), CacheError> {
        let mut slot = self.entry(index)?.lock();
        slot.ref_count = slot.ref_count.saturating_sub(1);
        if slot.ref_count == 0 {
            slot.evict_decoded();
        }
        Ok(())
    }

    /// Render (if needed) and compress page `index`.
    ///
    /// Returns the compressed size, or `None` when the page already was
    /// compressed. A raster that was already decoded stays decoded; one the
    /// worker rendered itself is dropped unless someone holds a reference.
    pub(crate) fn compress_page(&self, index: usize) -> Result<Option<usize>, CacheError> {
        let mut slot = self.entry(index)?.lock();

        let (pixmap, rendered_here) = match std::mem::take(&mut slot.state) {
            PageState::Decoded(pixmap) => (pixmap, false),
            PageState::Empty | PageState::Rendering => {
                slot.state = PageState::Rendering;
                match self.rasterize(index) {
                    Ok(pixmap) => {
                        slot.set_dimensions(&pixmap);
                        (Arc::new(pixmap), true)
                    }
                    Err(e) => {
                        slot.state = PageState::Empty;
                        slot.worker_failed = true;
                        return Err(e);
                    }
                }
            }
            already @ (PageState::Compressed(_) | PageState::DecodedAndCompressed(..)) => {
                slot.state = already;
                return Ok(None);
            }
        };

        let keep_decoded = !rendered_here || slot.ref_count > 0;
        match CompressedPixmap::from_pixmap(&pixmap) {
            Ok(compressed) => {
                let len = compressed.len();
                slot.state = if keep_decoded {
                    PageState::DecodedAndCompressed(pixmap, compressed)
                } else {
                    PageState::Compressed(compressed)
                };
                Ok(Some(len))
            }
            Err(source) => {
                slot.state = if keep_decoded {
                    PageState::Decoded(pixmap)
                } else {
                    PageState::Empty
                };
                slot.worker_failed = true;
                Err(CacheError::Compress {
                    page: index,
                    source,
                })
            }
        }
    }

    /// First page after `current` (wrapping, `current` itself last) that
    /// still needs compressing.
    pub(crate) fn next_uncompressed(&self, current: usize) -> Option<usize> {
        let n = self.pages.len();
        (1..=n)
            .map(|offset| (current + offset) % n)
            .find(|&index| self.pages[index].lock().needs_compression())
    }

    fn load_page(&self, index: usize) -> Result<PageView, CacheError> {
        let view = self.fetch_page(index)?;
        self.reference(index)?;

        {
            let mut links = lock(&self.links);
            let fetched = {
                let renderer = lock(&self.renderer);
                renderer
                    .page_natural_size(index)
                    .and_then(|(_, natural_height)| {
                        Ok((renderer.link_mapping(index)?, natural_height))
                    })
            };

            match fetched {
                Ok((mappings, natural_height)) => {
                    links.mappings = mappings;
                    links.scale = if natural_height > 0.0 {
                        f64::from(view.height) / natural_height
                    } else {
                        1.0
                    };
                }
                Err(e) => {
                    warn!("No link areas for page {index}: {e}");
                    links.mappings.clear();
                }
            }
        }

        // Last, so the worker never scans from a page whose links are stale
        self.control().current_index = index;
        debug!("Loaded page {index}");
        Ok(view)
    }

    fn action_at(&self, x: f64, y: f64) -> Option<Action> {
        let links = lock(&self.links);
        if links.scale <= 0.0 {
            return None;
        }
        let (px, py) = (x / links.scale, y / links.scale);
        links
            .mappings
            .iter()
            .find(|mapping| mapping.area.contains(px, py))
            .map(|mapping| mapping.action.clone())
    }

    fn status(&self) -> CacheStatus {
        let cached_bytes = self
            .pages
            .iter()
            .filter_map(PageEntry::try_lock)
            .map(|slot| slot.compressed_len())
            .sum();

        CacheStatus {
            pages_cached: self.control().pages_cached,
            total_pages: self.pages.len(),
            cached_bytes,
        }
    }
}

/// Cache for one loaded document.
///
/// Dropping the cache stops the caching worker and waits for it.
pub struct PageCache {
    core: Arc<CacheCore>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl PageCache {
    /// Open `path` with the PDF engine and build a cache rendering pages
    /// `scale_to_height` pixels high.
    #[cfg(feature = "pdf")]
    pub fn load_document(path: &Path, scale_to_height: f64) -> Result<Self, CacheError> {
        let backend = super::mupdf_backend::MupdfBackend::open(path).map_err(|e| {
            error!("Failed to open {path:?}: {e}");
            CacheError::DocumentOpen(e)
        })?;
        Self::from_backend(backend, scale_to_height)
    }

    /// Build a cache over an already opened document.
    pub fn from_backend(
        backend: impl DocumentBackend + 'static,
        scale_to_height: f64,
    ) -> Result<Self, CacheError> {
        if !(scale_to_height.is_finite() && scale_to_height > 0.0) {
            return Err(CacheError::InvalidScale(scale_to_height));
        }

        let page_count = backend.page_count();
        let pages = (0..page_count).map(|_| PageEntry::default()).collect();
        info!("Document loaded: {page_count} pages, rendering at {scale_to_height}px");

        Ok(Self {
            core: Arc::new(CacheCore {
                renderer: Mutex::new(Box::new(backend)),
                pages,
                control: Mutex::new(Control::default()),
                links: Mutex::new(CurrentLinks {
                    mappings: Vec::new(),
                    scale: 1.0,
                }),
                scale_to_height,
            }),
            worker: Mutex::new(None),
        })
    }

    /// Stop background caching and release the document.
    pub fn unload_document(self) {
        drop(self);
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.core.page_count()
    }

    #[must_use]
    pub fn scale_to_height(&self) -> f64 {
        self.core.scale_to_height
    }

    /// Page last loaded with [`PageCache::load_page`]
    #[must_use]
    pub fn current_index(&self) -> usize {
        self.core.control().current_index
    }

    /// Return page `index` ready for display, rendering or decompressing
    /// it first if needed. Blocks while another thread works on the page.
    pub fn fetch_page(&self, index: usize) -> Result<PageView, CacheError> {
        self.core.fetch_page(index)
    }

    pub fn reference(&self, index: usize) -> Result<(), CacheError> {
        self.core.reference(index)
    }

    /// Drop a reference; at zero the decoded raster is freed. The
    /// compressed form, if any, is kept.
    pub fn unref(&self, index: usize) -> Result<(), CacheError> {
        self.core.unref(index)
    }

    /// Make `index` the displayed page: fetch it, take a reference and
    /// rebuild its link areas.
    pub fn load_page(&self, index: usize) -> Result<PageView, CacheError> {
        self.core.load_page(index)
    }

    /// Action under raster position `(x, y)` of the current page
    #[must_use]
    pub fn get_action_from_pos(&self, x: f64, y: f64) -> Option<Action> {
        self.core.action_at(x, y)
    }

    #[must_use]
    pub fn get_named_dest(&self, name: &str) -> Option<Destination> {
        lock(&self.core.renderer).find_named_destination(name)
    }

    /// Statistics snapshot. Pages locked by another thread are left out of
    /// `cached_bytes` rather than waited for.
    #[must_use]
    pub fn get_status(&self) -> CacheStatus {
        self.core.status()
    }

    /// Call `callback(label, first_page)` for every outline entry.
    pub fn enum_labels(&self, mut callback: impl FnMut(&str, usize)) {
        let labels = lock(&self.core.renderer).outline_labels();
        for entry in &labels {
            callback(&entry.label, entry.first_page);
        }
    }

    /// Start compressing pages in the background. No-op while a worker is
    /// already running.
    pub fn start_caching(&self) {
        let mut handle = lock(&self.worker);

        if handle.as_ref().is_some_and(|h| !h.is_finished()) && self.is_caching() {
            return;
        }
        // A previous worker stopped by itself; reap it first
        Self::join(handle.take());

        self.core.control().caching_enabled = true;
        match worker::spawn(Arc::clone(&self.core)) {
            Ok(h) => *handle = Some(h),
            Err(e) => {
                error!("Failed to spawn caching worker: {e}");
                self.core.control().caching_enabled = false;
            }
        }
    }

    /// Stop the worker and wait for it to exit. No page is touched by the
    /// worker after this returns.
    pub fn stop_caching(&self) {
        // Cleared before and after taking the handle lock: the first lets a
        // `wait_caching` holding the lock finish, the second stops a worker
        // a concurrent `start_caching` spawned in between
        self.core.control().caching_enabled = false;
        let mut handle = lock(&self.worker);
        self.core.control().caching_enabled = false;
        Self::join(handle.take());
    }

    /// Wait for the worker to finish on its own.
    pub fn wait_caching(&self) {
        let mut handle = lock(&self.worker);
        Self::join(handle.take());
    }

    #[must_use]
    pub fn is_caching(&self) -> bool {
        self.core.control().caching_enabled
    }

    fn join(handle: Option<JoinHandle<()>>) {
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Caching worker panicked");
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn core(&self) -> &CacheCore {
        &self.core
    }
}

impl Drop for PageCache {
    fn drop(&mut self) {
        self.stop_caching();
        debug!("Document unloaded");
    }
}

#[cfg(test)]
impl CacheCore {
    pub(crate) fn corrupt_page(&self, index: usize) {
        let mut slot = self.pages[index].lock();
        match &mut slot.state {
            PageState::Compressed(c) | PageState::DecodedAndCompressed(_, c) => {
                c.corrupt_for_test();
            }
            _ => panic!("page {index} is not compressed"),
        }
    }

    pub(crate) fn has_decoded(&self, index: usize) -> bool {
        self.pages[index].lock().state.decoded().is_some()
    }

    pub(crate) fn ref_count(&self, index: usize) -> u32 {
        self.pages[index].lock().ref_count
    }
}
