use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use pdfpres::pdf::{CacheError, PageCache};
use pdfpres::test_utils::FakeBackend;
use serial_test::serial;

fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn five_page_document_scenario() {
    let backend = FakeBackend::new(5);
    let renders = backend.render_counter();
    let cache = PageCache::from_backend(backend, 768.0).unwrap();

    let first = cache.fetch_page(0).unwrap();
    assert_eq!(renders.count(0), 1);

    cache.start_caching();
    cache.wait_caching();
    let cached = cache.get_status();
    assert_eq!(cached.pages_cached, 5);
    assert_eq!(cached.total_pages, 5);

    cache.reference(0).unwrap();
    cache.unref(0).unwrap();
    assert_eq!(cache.get_status().cached_bytes, cached.cached_bytes);

    let again = cache.fetch_page(0).unwrap();
    assert_eq!(renders.count(0), 1);
    assert!(!Arc::ptr_eq(&first.pixmap, &again.pixmap));
    assert_eq!(*first.pixmap, *again.pixmap);
}

#[test]
fn decompressed_pages_match_rendered_ones() {
    let backend = FakeBackend::new(4).with_page_size(2, (900.0, 300.0));
    let renders = backend.render_counter();
    let cache = PageCache::from_backend(backend, 768.0).unwrap();

    let originals: Vec<_> = (0..4).map(|i| cache.fetch_page(i).unwrap()).collect();
    cache.start_caching();
    cache.wait_caching();

    for (index, original) in originals.iter().enumerate() {
        cache.reference(index).unwrap();
        cache.unref(index).unwrap();

        let restored = cache.fetch_page(index).unwrap();
        assert_eq!(*restored.pixmap, *original.pixmap, "page {index}");
        assert_eq!(restored.split_guess, original.split_guess);
    }
    assert_eq!(renders.total(), 4);
    assert!(originals[2].split_guess);
}

#[test]
fn concurrent_fetches_render_each_page_once() {
    let backend = FakeBackend::new(3).with_render_delay(Duration::from_millis(30));
    let renders = backend.render_counter();
    let cache = Arc::new(PageCache::from_backend(backend, 768.0).unwrap());

    let handles: Vec<_> = (0..6)
        .map(|i| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || cache.fetch_page(i % 3).map(|view| view.height))
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap().unwrap(), 768);
    }

    for page in 0..3 {
        assert_eq!(renders.count(page), 1, "page {page}");
    }
}

#[test]
fn worker_and_foreground_never_render_twice() {
    let backend = FakeBackend::new(12).with_render_delay(Duration::from_millis(3));
    let renders = backend.render_counter();
    let cache = PageCache::from_backend(backend, 768.0).unwrap();

    cache.start_caching();
    for page in (0..12).rev() {
        cache.fetch_page(page).unwrap();
    }
    cache.wait_caching();

    assert_eq!(cache.get_status().pages_cached, 12);
    for page in 0..12 {
        assert_eq!(renders.count(page), 1, "page {page}");
    }
}

#[test]
fn worker_stops_by_itself_when_everything_is_cached() {
    let cache = PageCache::from_backend(FakeBackend::new(6), 768.0).unwrap();

    cache.start_caching();
    wait_until(|| !cache.is_caching());

    assert_eq!(cache.get_status().pages_cached, 6);
    // Nothing left to join but the finished thread
    cache.stop_caching();
    cache.start_caching();
    cache.wait_caching();
    assert_eq!(cache.get_status().pages_cached, 6);
}

#[test]
#[serial]
fn stop_caching_is_a_hard_barrier() {
    let backend = FakeBackend::new(40).with_render_delay(Duration::from_millis(5));
    let renders = backend.render_counter();
    let cache = PageCache::from_backend(backend, 768.0).unwrap();

    cache.start_caching();
    wait_until(|| renders.total() >= 2);
    cache.stop_caching();

    let renders_at_stop = renders.total();
    let status_at_stop = cache.get_status();
    thread::sleep(Duration::from_millis(50));

    assert!(!cache.is_caching());
    assert_eq!(renders.total(), renders_at_stop);
    assert_eq!(cache.get_status(), status_at_stop);
    assert!(status_at_stop.pages_cached < 40);
}

#[test]
#[serial]
fn status_does_not_wait_for_busy_pages() {
    let backend = FakeBackend::new(3).with_render_delay(Duration::from_millis(300));
    let renders = backend.render_counter();
    let cache = PageCache::from_backend(backend, 768.0).unwrap();

    cache.start_caching();
    // Worker is now inside page 1's render
    thread::sleep(Duration::from_millis(50));

    let started = Instant::now();
    let status = cache.get_status();
    assert!(started.elapsed() < Duration::from_millis(200));
    assert_eq!(status.pages_cached, 0);

    cache.stop_caching();
    assert_eq!(renders.total(), 1);
}

#[test]
fn worker_follows_the_current_page() {
    let backend = FakeBackend::new(10).with_render_delay(Duration::from_millis(20));
    let renders = backend.render_counter();
    let cache = PageCache::from_backend(backend, 768.0).unwrap();

    cache.load_page(6).unwrap();
    assert_eq!(cache.current_index(), 6);
    cache.start_caching();
    wait_until(|| renders.count(7) == 1);
    cache.stop_caching();

    // Scanning starts right after page 6, so nothing before it came first
    assert_eq!(renders.count(0), 0);
}

#[test]
fn bad_indices_are_errors() {
    let cache = PageCache::from_backend(FakeBackend::new(2), 768.0).unwrap();

    assert!(matches!(
        cache.fetch_page(2),
        Err(CacheError::OutOfRange { index: 2, page_count: 2 })
    ));
    assert!(matches!(cache.load_page(usize::MAX), Err(CacheError::OutOfRange { .. })));
    assert!(cache.reference(3).is_err());
    assert!(cache.unref(3).is_err());
}

#[test]
fn worker_skips_broken_pages() {
    let backend = FakeBackend::new(5);
    backend.failures().fail_page(3);
    let cache = PageCache::from_backend(backend, 768.0).unwrap();

    cache.start_caching();
    cache.wait_caching();

    let status = cache.get_status();
    assert_eq!(status.pages_cached, 4);
    assert!(matches!(
        cache.fetch_page(3),
        Err(CacheError::Render { page: 3, .. })
    ));
    assert!(cache.fetch_page(4).is_ok());
}

#[test]
fn unloading_stops_a_running_worker() {
    let backend = FakeBackend::new(100).with_render_delay(Duration::from_millis(5));
    let renders = backend.render_counter();
    let cache = PageCache::from_backend(backend, 768.0).unwrap();

    cache.start_caching();
    cache.unload_document();

    let after_unload = renders.total();
    thread::sleep(Duration::from_millis(30));
    assert_eq!(renders.total(), after_unload);
    assert!(after_unload < 100);
}

#[test]
fn healed_page_is_cached_by_the_next_worker_run() {
    let backend = FakeBackend::new(3);
    let renders = backend.render_counter();
    let failures = backend.failures();
    let cache = PageCache::from_backend(backend, 768.0).unwrap();

    failures.fail_page(1);
    cache.start_caching();
    cache.wait_caching();
    assert_eq!(cache.get_status().pages_cached, 2);

    failures.heal_page(1);
    cache.fetch_page(1).unwrap();
    let renders_before = renders.count(1);

    cache.start_caching();
    cache.wait_caching();
    assert_eq!(cache.get_status().pages_cached, 3);
    // Compressed from the raster the foreground just rendered
    assert_eq!(renders.count(1), renders_before);

    cache.reference(1).unwrap();
    cache.unref(1).unwrap();
    cache.fetch_page(1).unwrap();
    assert_eq!(renders.count(1), renders_before);
}

#[test]
#[serial]
fn stop_caching_wins_over_a_concurrent_restart() {
    let backend = FakeBackend::new(400).with_render_delay(Duration::from_millis(10));
    let cache = Arc::new(PageCache::from_backend(backend, 768.0).unwrap());
    cache.start_caching();

    let restarter = {
        let cache = Arc::clone(&cache);
        thread::spawn(move || {
            for _ in 0..20 {
                cache.start_caching();
                thread::sleep(Duration::from_millis(1));
            }
        })
    };

    thread::sleep(Duration::from_millis(5));
    let started = Instant::now();
    cache.stop_caching();
    // Never waits for a whole 4s caching run, only for the page in flight
    assert!(started.elapsed() < Duration::from_secs(2));

    restarter.join().unwrap();
    cache.stop_caching();
    assert!(!cache.is_caching());
}
