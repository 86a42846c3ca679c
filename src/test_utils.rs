//! In-memory document backend for tests

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::pdf::{
    BackendError, Destination, DocumentBackend, LinkMapping, OutlineLabel, Pixmap,
};

/// Natural page size used unless overridden: 4:3, renders 1024x768 at 768px
pub const DEFAULT_PAGE_SIZE: (f64, f64) = (400.0, 300.0);

#[derive(Clone, Debug)]
struct FakePage {
    size: (f64, f64),
    links: Vec<LinkMapping>,
}

/// Render calls per page, shared with the backend after it moves into a cache
#[derive(Clone, Debug)]
pub struct RenderCounter(Arc<[AtomicUsize]>);

impl RenderCounter {
    pub fn count(&self, page: usize) -> usize {
        self.0.get(page).map_or(0, |c| c.load(Ordering::SeqCst))
    }

    pub fn total(&self) -> usize {
        self.0.iter().map(|c| c.load(Ordering::SeqCst)).sum()
    }
}

/// Pages whose rendering currently fails
#[derive(Clone, Debug, Default)]
pub struct FailureSwitch(Arc<Mutex<HashSet<usize>>>);

impl FailureSwitch {
    pub fn fail_page(&self, page: usize) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(page);
    }

    pub fn heal_page(&self, page: usize) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&page);
    }

    fn is_failing(&self, page: usize) -> bool {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&page)
    }
}

/// Document whose pages are flat colour fields, see [`FakeBackend::page_color`].
#[derive(Debug)]
pub struct FakeBackend {
    pages: Vec<FakePage>,
    labels: Vec<OutlineLabel>,
    named: HashMap<String, Destination>,
    render_delay: Duration,
    renders: RenderCounter,
    failures: FailureSwitch,
}

impl FakeBackend {
    pub fn new(page_count: usize) -> Self {
        Self {
            pages: vec![
                FakePage {
                    size: DEFAULT_PAGE_SIZE,
                    links: Vec::new(),
                };
                page_count
            ],
            labels: Vec::new(),
            named: HashMap::new(),
            render_delay: Duration::ZERO,
            renders: RenderCounter((0..page_count).map(|_| AtomicUsize::new(0)).collect()),
            failures: FailureSwitch::default(),
        }
    }

    pub fn with_page_size(mut self, page: usize, size: (f64, f64)) -> Self {
        self.pages[page].size = size;
        self
    }

    pub fn with_links(mut self, page: usize, links: Vec<LinkMapping>) -> Self {
        self.pages[page].links = links;
        self
    }

    pub fn with_labels(mut self, labels: &[(&str, usize)]) -> Self {
        self.labels = labels
            .iter()
            .map(|(label, first_page)| OutlineLabel {
                label: (*label).to_string(),
                first_page: *first_page,
            })
            .collect();
        self
    }

    /// `page_num` is 1-based, like destinations in a document
    pub fn with_named_destination(mut self, name: &str, page_num: usize) -> Self {
        self.named
            .insert(name.to_string(), Destination { page_num });
        self
    }

    pub fn with_render_delay(mut self, delay: Duration) -> Self {
        self.render_delay = delay;
        self
    }

    pub fn render_counter(&self) -> RenderCounter {
        self.renders.clone()
    }

    pub fn failures(&self) -> FailureSwitch {
        self.failures.clone()
    }

    /// Colour every pixel of page `page` is rendered with
    pub fn page_color(page: usize) -> [u8; 4] {
        [
            0x20 + (page * 29 % 0xC0) as u8,
            0x80,
            0xFF - (page * 13 % 0x80) as u8,
            0xFF,
        ]
    }

    fn page(&self, index: usize) -> Result<&FakePage, BackendError> {
        self.pages.get(index).ok_or(BackendError::NoSuchPage(index))
    }
}

impl DocumentBackend for FakeBackend {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_natural_size(&self, index: usize) -> Result<(f64, f64), BackendError> {
        Ok(self.page(index)?.size)
    }

    fn render(&self, index: usize, scale: f64) -> Result<Pixmap, BackendError> {
        let (w, h) = self.page(index)?.size;
        if !self.render_delay.is_zero() {
            std::thread::sleep(self.render_delay);
        }
        self.renders.0[index].fetch_add(1, Ordering::SeqCst);

        if self.failures.is_failing(index) {
            return Err(BackendError::generic(format!("injected failure on page {index}")));
        }

        let mut pixmap = Pixmap::new_white((scale * w) as u32, (scale * h) as u32);
        let color = Self::page_color(index);
        for px in pixmap.pixels.chunks_exact_mut(4) {
            px.copy_from_slice(&color);
        }
        Ok(pixmap)
    }

    fn link_mapping(&self, index: usize) -> Result<Vec<LinkMapping>, BackendError> {
        Ok(self.page(index)?.links.clone())
    }

    fn find_named_destination(&self, name: &str) -> Option<Destination> {
        self.named.get(name).cloned()
    }

    fn outline_labels(&self) -> Vec<OutlineLabel> {
        self.labels.clone()
    }
}
