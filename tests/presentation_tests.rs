use std::sync::Arc;

use chrono::NaiveTime;
use pdfpres::pdf::{Action, Destination, LinkMapping, LinkRect, NamedAction, PageCache};
use pdfpres::presentation::{Presentation, PresentationEvent};
use pdfpres::test_utils::FakeBackend;

fn open(backend: FakeBackend) -> Presentation {
    Presentation::new(Arc::new(PageCache::from_backend(backend, 768.0).unwrap()))
}

// Pages are 400x300 units, rendered at 2.56 px per unit
const PX_PER_UNIT: f64 = 2.56;

/// Button along the bottom edge of the page, in page units
fn button(x: f64, action: Action) -> LinkMapping {
    LinkMapping {
        area: LinkRect::new(x, 260.0, x + 40.0, 300.0),
        action,
    }
}

fn click(talk: &mut Presentation, x: f64, y: f64) -> Vec<PresentationEvent> {
    talk.perform_action_at(x * PX_PER_UNIT, y * PX_PER_UNIT)
}

#[test]
fn navigation_while_caching_runs() {
    let mut talk = open(FakeBackend::new(20));
    talk.cache().start_caching();

    for expected in 1..20 {
        assert_eq!(talk.next(), vec![PresentationEvent::PageChanged(expected)]);
        let view = talk.current_view().unwrap();
        assert_eq!((view.width, view.height), (1024, 768));
    }
    talk.cache().wait_caching();

    assert_eq!(talk.status().cached_pages, 20);
    assert_eq!(talk.cache().current_index(), 19);
    assert!(talk.current_view().is_ok());
}

#[test]
fn status_line_reports_cache_progress() {
    let mut talk = open(FakeBackend::new(3));
    talk.last();
    talk.cache().start_caching();
    talk.cache().wait_caching();

    let status = talk.status();
    assert_eq!((status.current_page, status.num_pages), (3, 3));
    assert_eq!(status.cached_pages, 3);
    assert!(status.cached_bytes > 0);

    let now = NaiveTime::from_hms_opt(14, 30, 0).unwrap();
    assert_eq!(
        talk.status_line(now),
        format!("Cache: (3/3, {} bytes) 3/3, 14:30:00", status.cached_bytes)
    );
}

#[test]
fn navigation_buttons_drive_the_talk() {
    let buttons = vec![
        button(0.0, Action::Named(NamedAction::PrevPage)),
        button(80.0, Action::Named(NamedAction::NextPage)),
        button(160.0, Action::GotoDest(Destination { page_num: 1 })),
        button(240.0, Action::Named(NamedAction::Find)),
    ];
    let mut backend = FakeBackend::new(4);
    for page in 0..4 {
        backend = backend.with_links(page, buttons.clone());
    }
    let mut talk = open(backend);

    assert_eq!(click(&mut talk, 100.0, 280.0), vec![PresentationEvent::PageChanged(1)]);
    assert_eq!(click(&mut talk, 100.0, 280.0), vec![PresentationEvent::PageChanged(2)]);
    assert_eq!(click(&mut talk, 20.0, 280.0), vec![PresentationEvent::PageChanged(1)]);
    assert_eq!(click(&mut talk, 180.0, 280.0), vec![PresentationEvent::PageChanged(0)]);
    // Already on page 1 of the document
    assert!(click(&mut talk, 180.0, 280.0).is_empty());
    assert_eq!(click(&mut talk, 260.0, 280.0), vec![PresentationEvent::Find]);
    // Between buttons, and above them
    assert!(!talk.has_action_at(60.0 * PX_PER_UNIT, 280.0 * PX_PER_UNIT));
    assert!(click(&mut talk, 100.0, 100.0).is_empty());
    assert_eq!(talk.current_page(), 0);
}

#[test]
fn console_previews_the_next_page() {
    let mut talk = open(FakeBackend::new(3));
    assert_eq!(talk.console_page(true), 1);
    assert_eq!(talk.console_page(false), 0);

    talk.last();
    assert_eq!(talk.console_page(true), 2);
}

#[test]
fn dropping_the_presentation_releases_its_page() {
    let cache = Arc::new(PageCache::from_backend(FakeBackend::new(2), 768.0).unwrap());
    let talk = Presentation::new(Arc::clone(&cache));
    drop(talk);

    // Reference count back at zero: unref saturates and the page stays fetchable
    cache.unref(0).unwrap();
    assert!(cache.fetch_page(0).is_ok());
    assert!(Arc::try_unwrap(cache).is_ok());
}
