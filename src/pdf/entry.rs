//! Per-page cache slot and its state machine

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

use super::codec::CompressedPixmap;
use super::types::{PageView, Pixmap, guess_split};

/// What a page slot currently holds.
///
/// `Rendering` is only ever observed by a thread that finds the slot after a
/// previous holder panicked mid-render; it is treated like `Empty`.
#[derive(Debug, Default)]
pub enum PageState {
    #[default]
    Empty,
    Rendering,
    Decoded(Arc<Pixmap>),
    Compressed(CompressedPixmap),
    DecodedAndCompressed(Arc<Pixmap>, CompressedPixmap),
}

impl PageState {
    #[must_use]
    pub fn decoded(&self) -> Option<&Arc<Pixmap>> {
        match self {
            Self::Decoded(px) | Self::DecodedAndCompressed(px, _) => Some(px),
            _ => None,
        }
    }

    #[must_use]
    pub fn compressed(&self) -> Option<&CompressedPixmap> {
        match self {
            Self::Compressed(c) | Self::DecodedAndCompressed(_, c) => Some(c),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_compressed(&self) -> bool {
        self.compressed().is_some()
    }

    /// Drop the decoded raster, keeping the compressed form if there is one.
    #[must_use]
    fn without_decoded(self) -> Self {
        match self {
            Self::Decoded(_) | Self::Rendering => Self::Empty,
            Self::DecodedAndCompressed(_, c) => Self::Compressed(c),
            other => other,
        }
    }
}

/// Whether the slot's data can be trusted
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Health {
    #[default]
    Ok,
    /// Compressed bytes failed to decode; always re-render from the document
    CorruptCompressed,
    /// Re-rendering after a decode failure failed too
    Unavailable,
}

#[derive(Debug, Default)]
pub struct PageSlot {
    pub state: PageState,
    pub width: u32,
    pub height: u32,
    pub ref_count: u32,
    pub split_guess: bool,
    pub health: Health,
    /// The caching worker failed on this page and will not retry it
    pub worker_failed: bool,
}

impl PageSlot {
    /// Record a fresh raster's dimensions.
    pub fn set_dimensions(&mut self, pixmap: &Pixmap) {
        self.width = pixmap.width;
        self.height = pixmap.height;
    }

    /// View of a decoded raster. Recomputes `split_guess` every time.
    pub fn view(&mut self, pixmap: Arc<Pixmap>) -> PageView {
        self.split_guess = guess_split(self.width, self.height);
        PageView {
            pixmap,
            width: self.width,
            height: self.height,
            split_guess: self.split_guess,
        }
    }

    pub fn evict_decoded(&mut self) {
        self.state = std::mem::take(&mut self.state).without_decoded();
    }

    /// Compressed size, zero when the page has never been compressed
    #[must_use]
    pub fn compressed_len(&self) -> usize {
        self.state.compressed().map_or(0, CompressedPixmap::len)
    }

    #[must_use]
    pub fn needs_compression(&self) -> bool {
        !self.state.is_compressed() && !self.worker_failed && self.health != Health::Unavailable
    }
}

/// One page of the cache: the slot plus the lock guarding it.
#[derive(Debug, Default)]
pub struct PageEntry {
    slot: Mutex<PageSlot>,
}

impl PageEntry {
    pub fn lock(&self) -> MutexGuard<'_, PageSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Non-blocking lock; `None` while another thread holds the slot.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, PageSlot>> {
        match self.slot.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compressed(width: u32, height: u32) -> CompressedPixmap {
        CompressedPixmap::from_pixmap(&Pixmap::new_white(width, height)).unwrap()
    }

    #[test]
    fn eviction_keeps_compressed_form() {
        let mut slot = PageSlot {
            state: PageState::DecodedAndCompressed(
                Arc::new(Pixmap::new_white(4, 4)),
                compressed(4, 4),
            ),
            ..PageSlot::default()
        };
        let len = slot.compressed_len();

        slot.evict_decoded();

        assert!(matches!(slot.state, PageState::Compressed(_)));
        assert_eq!(slot.compressed_len(), len);
    }

    #[test]
    fn eviction_of_uncompressed_page_empties_it() {
        let mut slot = PageSlot {
            state: PageState::Decoded(Arc::new(Pixmap::new_white(4, 4))),
            ..PageSlot::default()
        };
        slot.evict_decoded();
        assert!(matches!(slot.state, PageState::Empty));
        assert_eq!(slot.compressed_len(), 0);
    }

    #[test]
    fn view_recomputes_split_guess() {
        let mut slot = PageSlot {
            width: 2000,
            height: 768,
            split_guess: false,
            ..PageSlot::default()
        };
        let view = slot.view(Arc::new(Pixmap::new_white(1, 1)));
        assert!(view.split_guess);
        assert!(slot.split_guess);

        slot.width = 1024;
        assert!(!slot.view(Arc::new(Pixmap::new_white(1, 1))).split_guess);
    }

    #[test]
    fn try_lock_skips_held_entry() {
        let entry = PageEntry::default();
        let guard = entry.lock();
        assert!(entry.try_lock().is_none());
        drop(guard);
        assert!(entry.try_lock().is_some());
    }

    #[test]
    fn failed_pages_are_not_scheduled() {
        let mut slot = PageSlot::default();
        assert!(slot.needs_compression());
        slot.worker_failed = true;
        assert!(!slot.needs_compression());
    }
}
