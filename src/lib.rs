// Export modules for the binary and the integration tests
pub mod overview;
pub mod panic_handler;
pub mod pdf;
pub mod presentation;
pub mod settings;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use overview::{GridStatus, OverviewGrid, OverviewRenderer};
pub use pdf::{CacheError, PageCache, PageView};
pub use presentation::{Presentation, PresentationEvent};
