//! Navigation on top of the page cache
//!
//! Holds exactly one cache reference, on the displayed page, and turns link
//! activations into navigation or into events for the UI layer.

use std::sync::Arc;

use chrono::NaiveTime;
use log::{debug, info, warn};

use crate::pdf::{Action, CacheError, NamedAction, PageCache, PageView};
use crate::settings::NotesMode;

/// Something the UI layer has to react to
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PresentationEvent {
    PageChanged(usize),
    /// The page became current but could not be loaded; show a failure
    /// indicator instead of a blank page
    PageUnavailable(usize),
    Find,
    GoToPage,
    GoForward,
    GoBack,
    Quit,
}

/// Snapshot for the console window
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PresentationStatus {
    /// 1-based
    pub current_page: usize,
    pub num_pages: usize,
    pub cached_pages: usize,
    pub cached_bytes: usize,
}

impl PresentationStatus {
    /// `Cache: (cached/total, bytes) page/total, HH:MM:SS`
    #[must_use]
    pub fn line(&self, now: NaiveTime) -> String {
        format!(
            "Cache: ({}/{}, {} bytes) {}/{}, {}",
            self.cached_pages,
            self.num_pages,
            self.cached_bytes,
            self.current_page,
            self.num_pages,
            now.format("%H:%M:%S")
        )
    }
}

pub struct Presentation {
    cache: Arc<PageCache>,
    current: usize,
    /// Whether `current` holds a cache reference
    holding: bool,
}

impl Presentation {
    /// Start on the first page.
    pub fn new(cache: Arc<PageCache>) -> Self {
        let mut presentation = Self {
            cache,
            current: 0,
            holding: false,
        };
        presentation.load_current();
        presentation
    }

    #[must_use]
    pub fn current_page(&self) -> usize {
        self.current
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.cache.page_count()
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<PageCache> {
        &self.cache
    }

    /// Raster of the displayed page
    pub fn current_view(&self) -> Result<PageView, CacheError> {
        self.cache.fetch_page(self.current)
    }

    /// Whether the displayed page is shown as slide and notes side by side
    pub fn shows_notes(&self, mode: NotesMode) -> Result<bool, CacheError> {
        Ok(mode.splits(self.current_view()?.split_guess))
    }

    /// Page shown in the console window: the next one when previewing
    #[must_use]
    pub fn console_page(&self, show_preview: bool) -> usize {
        if show_preview {
            (self.current + 1).min(self.page_count().saturating_sub(1))
        } else {
            self.current
        }
    }

    pub fn next(&mut self) -> Vec<PresentationEvent> {
        if self.current + 1 < self.page_count() {
            self.goto(self.current + 1)
        } else {
            Vec::new()
        }
    }

    pub fn prev(&mut self) -> Vec<PresentationEvent> {
        match self.current.checked_sub(1) {
            Some(index) => self.goto(index),
            None => Vec::new(),
        }
    }

    pub fn first(&mut self) -> Vec<PresentationEvent> {
        self.goto(0)
    }

    pub fn last(&mut self) -> Vec<PresentationEvent> {
        match self.page_count().checked_sub(1) {
            Some(index) => self.goto(index),
            None => Vec::new(),
        }
    }

    /// Show page `index`. No-op when it is already shown or out of range.
    pub fn goto(&mut self, index: usize) -> Vec<PresentationEvent> {
        if index == self.current || index >= self.page_count() {
            return Vec::new();
        }

        self.release_current();
        self.current = index;
        vec![self.load_current()]
    }

    /// Whether a link sits under raster position `(x, y)`.
    #[must_use]
    pub fn has_action_at(&self, x: f64, y: f64) -> bool {
        self.cache.get_action_from_pos(x, y).is_some()
    }

    /// Activate the link under `(x, y)`, if any.
    pub fn perform_action_at(&mut self, x: f64, y: f64) -> Vec<PresentationEvent> {
        let Some(action) = self.cache.get_action_from_pos(x, y) else {
            return Vec::new();
        };
        debug!("Link at ({x}, {y}): {action:?}");

        match action {
            Action::GotoDest(dest) => self.goto_page_num(dest.page_num),
            Action::GotoNamed(name) => match self.cache.get_named_dest(&name) {
                Some(dest) => self.goto_page_num(dest.page_num),
                None => {
                    warn!("Unknown named destination {name:?}");
                    Vec::new()
                }
            },
            Action::Named(named) => self.perform_named(named),
            Action::Uri(uri) => {
                info!("Ignoring external link {uri}");
                Vec::new()
            }
        }
    }

    fn perform_named(&mut self, action: NamedAction) -> Vec<PresentationEvent> {
        match action {
            NamedAction::FirstPage => self.first(),
            NamedAction::LastPage => self.last(),
            NamedAction::PrevPage => self.prev(),
            NamedAction::NextPage => self.next(),
            NamedAction::Find => vec![PresentationEvent::Find],
            NamedAction::GoToPage => vec![PresentationEvent::GoToPage],
            NamedAction::GoForward => vec![PresentationEvent::GoForward],
            NamedAction::GoBack => vec![PresentationEvent::GoBack],
            NamedAction::Quit => vec![PresentationEvent::Quit],
            NamedAction::Other(name) => {
                warn!("Unhandled named action: {name}");
                Vec::new()
            }
        }
    }

    // Destinations number pages from 1
    fn goto_page_num(&mut self, page_num: usize) -> Vec<PresentationEvent> {
        match page_num.checked_sub(1) {
            Some(index) => self.goto(index),
            None => Vec::new(),
        }
    }

    #[must_use]
    pub fn status(&self) -> PresentationStatus {
        let cache = self.cache.get_status();
        PresentationStatus {
            current_page: self.current + 1,
            num_pages: cache.total_pages,
            cached_pages: cache.pages_cached,
            cached_bytes: cache.cached_bytes,
        }
    }

    #[must_use]
    pub fn status_line(&self, now: NaiveTime) -> String {
        self.status().line(now)
    }

    /// Switch to a freshly loaded cache for the same talk, staying on the
    /// current page when it still exists.
    pub fn reload(&mut self, cache: Arc<PageCache>) -> Vec<PresentationEvent> {
        self.release_current();
        self.cache = cache;
        self.current = self.current.min(self.page_count().saturating_sub(1));
        vec![self.load_current()]
    }

    fn load_current(&mut self) -> PresentationEvent {
        match self.cache.load_page(self.current) {
            Ok(_) => {
                self.holding = true;
                PresentationEvent::PageChanged(self.current)
            }
            Err(e) => {
                warn!("Failed to load page {}: {e}", self.current);
                PresentationEvent::PageUnavailable(self.current)
            }
        }
    }

    fn release_current(&mut self) {
        if std::mem::take(&mut self.holding) {
            if let Err(e) = self.cache.unref(self.current) {
                warn!("Failed to release page {}: {e}", self.current);
            }
        }
    }
}

impl Drop for Presentation {
    fn drop(&mut self) {
        self.release_current();
    }
}
