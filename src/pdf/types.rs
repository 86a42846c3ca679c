//! Core types for the page cache

use std::sync::Arc;

/// Bytes per pixel of every raster the cache hands out (RGBA, 8 bits per channel)
pub const BYTES_PER_PIXEL: usize = 4;

/// Row length in bytes of a raster `width` pixels wide.
#[inline]
#[must_use]
pub const fn stride(width: u32) -> usize {
    width as usize * BYTES_PER_PIXEL
}

/// A page is probably slide + speaker notes side by side when it is more
/// than twice as wide as it is high.
#[inline]
#[must_use]
pub fn guess_split(width: u32, height: u32) -> bool {
    u64::from(width) > 2 * u64::from(height)
}

/// Raster dimensions of a page whose natural size is `natural`, rendered so
/// its height becomes `scale_to_height` pixels.
///
/// Returns `(scale, width_px, height_px)`.
#[must_use]
pub fn raster_size(natural: (f64, f64), scale_to_height: f64) -> (f64, u32, u32) {
    let (w, h) = natural;
    if !(h > 0.0) || !(w > 0.0) {
        return (0.0, 0, 0);
    }
    let scale = scale_to_height / h;
    (scale, (scale * w) as u32, (scale * h) as u32)
}

/// Decoded RGBA raster of one page.
///
/// Rows are tightly packed: `pixels.len() == height * stride(width)`.
#[derive(Clone, PartialEq, Eq)]
pub struct Pixmap {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl Pixmap {
    /// Opaque white raster of the given size.
    #[must_use]
    pub fn new_white(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0xFF; height as usize * stride(width)],
        }
    }

    /// Wrap raw RGBA bytes, rejecting buffers that do not match the dimensions.
    #[must_use]
    pub fn from_raw(width: u32, height: u32, pixels: Vec<u8>) -> Option<Self> {
        (pixels.len() == height as usize * stride(width)).then_some(Self {
            width,
            height,
            pixels,
        })
    }

    #[must_use]
    pub fn stride(&self) -> usize {
        stride(self.width)
    }

    /// Size of the decoded buffer in bytes
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }

    /// RGBA value at `(x, y)`, `None` outside the raster.
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = y as usize * self.stride() + x as usize * BYTES_PER_PIXEL;
        let px = &self.pixels[offset..offset + BYTES_PER_PIXEL];
        Some([px[0], px[1], px[2], px[3]])
    }
}

impl std::fmt::Debug for Pixmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pixmap")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish_non_exhaustive()
    }
}

/// Result of a successful `fetch_page`.
///
/// The raster is shared: evicting the page from the cache does not
/// invalidate a view that is still held.
#[derive(Clone, Debug)]
pub struct PageView {
    pub pixmap: Arc<Pixmap>,
    pub width: u32,
    pub height: u32,
    pub split_guess: bool,
}

/// Clickable area in page coordinates.
///
/// Corners may be given in either order; both edges are inclusive.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LinkRect {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl LinkRect {
    #[must_use]
    pub const fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    #[must_use]
    pub fn contains(&self, x: f64, y: f64) -> bool {
        let in_x = (x >= self.x1 && x <= self.x2) || (x <= self.x1 && x >= self.x2);
        let in_y = (y >= self.y1 && y <= self.y2) || (y <= self.y1 && y >= self.y2);
        in_x && in_y
    }
}

/// Link destination as stored in the document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Destination {
    /// Page number, 1-based like the document format numbers them
    pub page_num: usize,
}

/// Viewer actions a document can trigger by name
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NamedAction {
    Find,
    GoToPage,
    GoForward,
    GoBack,
    FirstPage,
    LastPage,
    PrevPage,
    NextPage,
    Quit,
    Other(String),
}

impl NamedAction {
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "Find" => Self::Find,
            "GoToPage" => Self::GoToPage,
            "GoForward" => Self::GoForward,
            "GoBack" => Self::GoBack,
            "FirstPage" => Self::FirstPage,
            "LastPage" => Self::LastPage,
            "PrevPage" => Self::PrevPage,
            "NextPage" => Self::NextPage,
            "Quit" => Self::Quit,
            other => Self::Other(other.to_string()),
        }
    }
}

/// What happens when a link area is clicked
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    GotoDest(Destination),
    GotoNamed(String),
    Named(NamedAction),
    Uri(String),
}

/// One clickable region of a page
#[derive(Clone, Debug, PartialEq)]
pub struct LinkMapping {
    pub area: LinkRect,
    pub action: Action,
}

/// Outline entry: a label and the first page (0-indexed) it applies to
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutlineLabel {
    pub label: String,
    pub first_page: usize,
}

/// Best-effort cache statistics snapshot
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStatus {
    pub pages_cached: usize,
    pub total_pages: usize,
    pub cached_bytes: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_rect_accepts_either_corner_order() {
        let forward = LinkRect::new(10.0, 10.0, 20.0, 30.0);
        let reversed = LinkRect::new(20.0, 30.0, 10.0, 10.0);

        for rect in [forward, reversed] {
            assert!(rect.contains(15.0, 20.0));
            assert!(rect.contains(10.0, 10.0), "edges are inclusive");
            assert!(rect.contains(20.0, 30.0), "edges are inclusive");
            assert!(!rect.contains(21.0, 20.0));
            assert!(!rect.contains(15.0, 9.5));
        }
    }

    #[test]
    fn split_guess_needs_more_than_double_width() {
        assert!(!guess_split(1024, 768));
        assert!(!guess_split(1536, 768));
        assert!(guess_split(1537, 768));
    }

    #[test]
    fn raster_size_scales_to_height() {
        let (scale, w, h) = raster_size((400.0, 300.0), 768.0);
        assert!((scale - 2.56).abs() < 1e-9);
        assert_eq!((w, h), (1024, 768));

        assert_eq!(raster_size((400.0, 0.0), 768.0), (0.0, 0, 0));
    }

    #[test]
    fn pixmap_from_raw_checks_length() {
        assert!(Pixmap::from_raw(2, 2, vec![0; 16]).is_some());
        assert!(Pixmap::from_raw(2, 2, vec![0; 15]).is_none());

        let white = Pixmap::new_white(3, 2);
        assert_eq!(white.byte_len(), 24);
        assert_eq!(white.pixel(2, 1), Some([0xFF; 4]));
        assert_eq!(white.pixel(3, 0), None);
    }

    #[test]
    fn named_actions_parse() {
        assert_eq!(NamedAction::from_name("NextPage"), NamedAction::NextPage);
        assert_eq!(
            NamedAction::from_name("Print"),
            NamedAction::Other("Print".to_string())
        );
    }
}
