use image::RgbImage;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use webtoon_reader::config::ReaderConfig;
use webtoon_reader::file_utils::{scan_page_sizes, scan_pages};
use webtoon_reader::image_cache::CacheKey;
use webtoon_reader::image_loader::RgbBackend;
use webtoon_reader::render::Renderer;
use webtoon_reader::state::Viewport;
use webtoon_reader::view_mode::{ViewMode, Zoom};
use webtoon_reader::ReaderSession;

const DRAIN: Duration = Duration::from_secs(60);

fn config() -> ReaderConfig {
    ReaderConfig {
        cache_capacity: 30,
        viewport_width: 1000,
        viewport_height: 800,
        poll_interval_ms: 10,
        ..ReaderConfig::default()
    }
}

/// `count` pages of 20x60, drawn 400x1200 in a 1000 px wide viewport.
fn chapter(count: usize) -> (TempDir, Vec<PathBuf>) {
    let dir = tempfile::tempdir().unwrap();
    for i in 1..=count {
        RgbImage::from_pixel(20, 60, image::Rgb([200, 180, 160]))
            .save(dir.path().join(format!("{:02}.png", i)))
            .unwrap();
    }
    let pages = scan_pages(dir.path()).unwrap();
    assert_eq!(pages.len(), count);
    (dir, pages)
}

fn open(pages: Vec<PathBuf>) -> ReaderSession<RgbBackend> {
    let sizes = scan_page_sizes(&pages);
    ReaderSession::open(pages, sizes, ViewMode::Webtoon, config()).unwrap()
}

fn key(page: &Path, viewport: Viewport) -> CacheKey {
    CacheKey::new(page, ViewMode::Webtoon, Zoom::ONE, viewport)
}

#[test]
fn forward_sweep_keeps_previous_run_resident() {
    let (_dir, pages) = chapter(50);
    let mut session = open(pages.clone());
    let viewport = session.viewport();

    let mut previous: Vec<usize> = Vec::new();
    let mut offset = 0u32;
    while offset <= 50_000 {
        assert_eq!(session.scroll(), Some(offset));

        let frame = session.render_frame();
        assert!(!frame.visible.is_empty(), "nothing visible at {}", offset);
        assert!(
            frame.visible.windows(2).all(|w| w[1] == w[0] + 1),
            "visible run {:?} at {} is not contiguous",
            frame.visible,
            offset
        );
        if let Renderer::Webtoon(r) = session.renderer() {
            let slots = r.layout().slots();
            assert!(frame.visible.windows(2).all(|w| slots[w[0]].offset < slots[w[1]].offset));
        }

        assert!(session.preloader().wait_idle(DRAIN));
        let cache = session.cache();
        for &index in previous.iter().chain(&frame.visible) {
            assert!(
                cache.contains(&key(&pages[index], viewport)),
                "page {} evicted at offset {}",
                index + 1,
                offset
            );
        }
        assert!(cache.len() <= 30);

        // Everything around the viewport is resident, so a repeat queues nothing.
        assert_eq!(
            session
                .preloader()
                .preload(&frame.visible, ViewMode::Webtoon, Zoom::ONE, viewport),
            0
        );

        previous = frame.visible;
        session.scroll_by(800);
        offset += 800;
    }

    let stats = session.cache_stats();
    assert!(stats.evictions > 0);
    assert!(stats.resident <= stats.capacity);
}

#[test]
fn broken_page_does_not_stop_the_sweep() {
    let (_dir, pages) = chapter(8);
    std::fs::write(&pages[2], b"truncated").unwrap();
    let mut session = open(pages);

    let mut saw_placeholder = false;
    for _ in 0..100 {
        let frame = session.render_frame();
        saw_placeholder |= frame
            .placements
            .iter()
            .any(|p| p.index == 2 && p.surface.is_none());
        if session.at_end() {
            break;
        }
        session.page_down();
    }

    assert!(saw_placeholder);
    assert!(session.at_end());
    assert_eq!(session.current_page(), 8);
}
