//! Background caching worker - runs in its own thread
//!
//! Compresses pages ahead of the presenter so that later fetches only pay
//! for decompression. The worker re-reads `current_index` before every
//! page, so it follows the presenter around the document.

use std::sync::Arc;
use std::thread::JoinHandle;

use log::{debug, info, warn};

use super::cache::CacheCore;

pub(crate) fn spawn(core: Arc<CacheCore>) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("page-cache".to_string())
        .spawn(move || caching_worker(&core))
}

/// Main worker loop. Exits when caching is disabled, or by itself once no
/// page is left to compress.
fn caching_worker(core: &CacheCore) {
    let total = core.page_count();
    debug!("Caching worker started ({total} pages)");

    loop {
        let current = {
            let mut control = core.control();
            if !control.caching_enabled {
                debug!("Caching worker stopped");
                return;
            }
            if control.pages_cached >= total {
                control.caching_enabled = false;
                info!("All {total} pages cached");
                return;
            }
            control.current_index
        };

        let Some(index) = core.next_uncompressed(current) else {
            let mut control = core.control();
            control.caching_enabled = false;
            info!(
                "Caching finished: {} of {total} pages cached",
                control.pages_cached
            );
            return;
        };

        match core.compress_page(index) {
            Ok(Some(len)) => {
                let mut control = core.control();
                control.pages_cached += 1;
                debug!(
                    "Cached page {index} ({len} bytes, {}/{total})",
                    control.pages_cached
                );
            }
            Ok(None) => {}
            Err(e) => warn!("Skipping page {index} in background caching: {e}"),
        }
    }
}
