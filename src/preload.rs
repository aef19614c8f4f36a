//! Background preloading of pages around the visible range.
//!
//! A single worker thread drains a FIFO queue of decode requests. The render
//! thread never waits on it; it only enqueues. Requests are stamped with the
//! worker generation at enqueue time; [`PreloadWorker::invalidate`] moves the
//! generation on and every older request is dropped unprocessed.

use crate::error::{AppError, Result};
use crate::file_utils::PathExt;
use crate::image_cache::{CacheKey, SharedCache};
use crate::image_loader::{SurfaceBackend, load_image};
use crate::state::Viewport;
use crate::view_mode::{ViewMode, Zoom};
use log::{debug, info, warn};
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// One page to decode ahead of need, sized by its key.
#[derive(Debug, Clone)]
pub struct PreloadRequest {
    pub index: usize,
    pub key: CacheKey,
}

struct Queued {
    generation: u64,
    request: PreloadRequest,
}

/// Preload margins and queue polling.
#[derive(Debug, Clone, Copy)]
pub struct PreloadWindow {
    pub before: usize,
    pub after: usize,
    /// Queue wait before the worker re-checks its running flag.
    pub poll_interval: Duration,
}

pub struct PreloadWorker<B: SurfaceBackend> {
    sender: Option<Sender<Queued>>,
    handle: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
    pending: Arc<AtomicUsize>,
    generation: Arc<AtomicU64>,
    pages: Arc<[PathBuf]>,
    cache: SharedCache<B::Surface>,
    window: PreloadWindow,
    _backend: PhantomData<B>,
}

impl<B: SurfaceBackend> PreloadWorker<B> {
    /// Spawns the worker thread.
    pub fn start(
        pages: Arc<[PathBuf]>,
        cache: SharedCache<B::Surface>,
        window: PreloadWindow,
    ) -> Result<Self> {
        let (sender, receiver) = mpsc::channel::<Queued>();
        let running = Arc::new(AtomicBool::new(true));
        let pending = Arc::new(AtomicUsize::new(0));
        let generation = Arc::new(AtomicU64::new(0));

        let handle = {
            let running = running.clone();
            let pending = pending.clone();
            let generation = generation.clone();
            let pages = pages.clone();
            let cache = cache.clone();
            let poll_interval = window.poll_interval;
            thread::Builder::new()
                .name("preload".to_string())
                .spawn(move || {
                    debug!("Preload worker started");
                    while running.load(Ordering::Acquire) {
                        match receiver.recv_timeout(poll_interval) {
                            Ok(queued) => {
                                process_request::<B>(&pages, &cache, &generation, queued);
                                pending.fetch_sub(1, Ordering::AcqRel);
                            }
                            Err(RecvTimeoutError::Timeout) => continue,
                            Err(RecvTimeoutError::Disconnected) => break,
                        }
                    }
                    debug!("Preload worker exiting");
                })
                .map_err(|e| AppError::Worker(e.to_string()))?
        };

        Ok(Self {
            sender: Some(sender),
            handle: Some(handle),
            running,
            pending,
            generation,
            pages,
            cache,
            window,
            _backend: PhantomData,
        })
    }

    /// Enqueues one request. Returns `false` once the worker is stopped.
    pub fn request(&self, request: PreloadRequest) -> bool {
        let Some(sender) = &self.sender else {
            return false;
        };
        let queued = Queued {
            generation: self.generation.load(Ordering::Acquire),
            request,
        };
        self.pending.fetch_add(1, Ordering::AcqRel);
        if sender.send(queued).is_err() {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            warn!("Preload worker is gone, request dropped");
            return false;
        }
        true
    }

    /// Enqueues the padded window around `visible` at `mode`/`zoom`, skipping
    /// pages already cached. Returns how many requests were queued.
    pub fn preload(&self, visible: &[usize], mode: ViewMode, zoom: Zoom, viewport: Viewport) -> usize {
        let (Some(&first), Some(&last)) = (visible.iter().min(), visible.iter().max()) else {
            return 0;
        };
        if self.pages.is_empty() {
            return 0;
        }

        let start = first.saturating_sub(self.window.before);
        let end = last.saturating_add(self.window.after).min(self.pages.len() - 1);

        let mut queued = 0;
        for index in start..=end {
            let key = CacheKey::new(self.pages[index].clone(), mode, zoom, viewport);
            if self.cache.contains(&key) {
                continue;
            }
            if !self.request(PreloadRequest { index, key }) {
                break;
            }
            queued += 1;
        }

        if queued > 0 {
            debug!("Preload queued {} pages around {}..={}", queued, first + 1, last + 1);
        }
        queued
    }

    /// Drops every request queued so far, including one being decoded.
    ///
    /// Called when the surfaces they would produce no longer fit, e.g. on a
    /// viewport resize.
    pub fn invalidate(&self) {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(
            "Preload generation {}: dropping {} queued requests",
            generation,
            self.pending()
        );
    }

    /// Requests not yet processed.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some() && self.running.load(Ordering::Acquire)
    }

    /// Blocks until the queue drains or `timeout` passes. Returns whether it drained.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.pending() > 0 {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(2));
        }
        true
    }

    /// Stops the worker after its in-flight decode and joins it.
    ///
    /// Requests still queued are discarded.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        self.sender = None;
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Preload worker panicked");
            }
            info!("Preload worker stopped");
        }
    }
}

impl<B: SurfaceBackend> Drop for PreloadWorker<B> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn process_request<B: SurfaceBackend>(
    pages: &[PathBuf],
    cache: &SharedCache<B::Surface>,
    generation: &AtomicU64,
    queued: Queued,
) {
    let stale = || queued.generation != generation.load(Ordering::Acquire);
    let request = &queued.request;
    if stale() {
        return;
    }
    if request.index >= pages.len() {
        debug!(
            "Preload of page {} ignored: sequence has {} pages",
            request.index + 1,
            pages.len()
        );
        return;
    }
    // A duplicate queued before the first one finished lands here.
    if cache.contains(&request.key) {
        return;
    }

    let key = &request.key;
    match load_image::<B>(key.page(), key.viewport(), key.zoom(), key.mode()) {
        // The generation may have moved on while decoding.
        Ok(_) if stale() => debug!(
            "Preload of {} dropped after invalidation",
            key.page().format_for_log()
        ),
        Ok(loaded) => cache.put(key.clone(), loaded),
        Err(e) => warn!("Preload of {} failed: {}", key.page().format_for_log(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_cache::ImageCache;
    use crate::image_loader::RgbBackend;
    use image::RgbImage;
    use std::collections::HashSet;
    use std::sync::{Mutex, PoisonError};

    const VIEWPORT: Viewport = Viewport {
        width: 100,
        height: 80,
    };
    const DRAIN: Duration = Duration::from_secs(30);

    fn window() -> PreloadWindow {
        PreloadWindow {
            before: 2,
            after: 2,
            poll_interval: Duration::from_millis(10),
        }
    }

    fn pages(dir: &std::path::Path, count: usize) -> Arc<[PathBuf]> {
        (0..count)
            .map(|i| {
                let path = dir.join(format!("{}.png", i + 1));
                RgbImage::new(20, 40).save(&path).unwrap();
                path
            })
            .collect()
    }

    fn cached_pages(cache: &ImageCache<Arc<RgbImage>>) -> HashSet<PathBuf> {
        cache.keys().iter().map(|k| k.page().to_path_buf()).collect()
    }

    #[test]
    fn preloads_the_padded_window() {
        let dir = tempfile::tempdir().unwrap();
        let pages = pages(dir.path(), 10);
        let cache = Arc::new(ImageCache::new(30, 10));
        let worker = PreloadWorker::<RgbBackend>::start(pages.clone(), cache.clone(), window()).unwrap();

        assert_eq!(worker.preload(&[4, 5], ViewMode::Webtoon, Zoom::ONE, VIEWPORT), 6);
        assert!(worker.wait_idle(DRAIN));

        let expected: HashSet<PathBuf> = pages[2..=7].iter().cloned().collect();
        assert_eq!(cached_pages(&cache), expected);
    }

    #[test]
    fn window_is_clipped_to_the_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let pages = pages(dir.path(), 4);
        let cache = Arc::new(ImageCache::new(30, 10));
        let worker = PreloadWorker::<RgbBackend>::start(pages, cache.clone(), window()).unwrap();

        assert_eq!(worker.preload(&[0], ViewMode::Manga, Zoom::ONE, VIEWPORT), 3);
        assert!(worker.wait_idle(DRAIN));
        assert_eq!(worker.preload(&[3], ViewMode::Manga, Zoom::ONE, VIEWPORT), 1);
        assert!(worker.wait_idle(DRAIN));
        assert_eq!(cache.len(), 4);
        assert!(cache.keys().iter().all(|k| k.mode() == ViewMode::Manga));
    }

    #[test]
    fn repeated_preload_matches_a_single_one() {
        let dir = tempfile::tempdir().unwrap();
        let pages = pages(dir.path(), 12);

        let once = Arc::new(ImageCache::new(30, 10));
        let worker = PreloadWorker::<RgbBackend>::start(pages.clone(), once.clone(), window()).unwrap();
        worker.preload(&[5, 6], ViewMode::Webtoon, Zoom::ONE, VIEWPORT);
        assert!(worker.wait_idle(DRAIN));

        let twice = Arc::new(ImageCache::new(30, 10));
        let worker = PreloadWorker::<RgbBackend>::start(pages, twice.clone(), window()).unwrap();
        worker.preload(&[5, 6], ViewMode::Webtoon, Zoom::ONE, VIEWPORT);
        worker.preload(&[5, 6], ViewMode::Webtoon, Zoom::ONE, VIEWPORT);
        assert!(worker.wait_idle(DRAIN));

        assert_eq!(cached_pages(&once), cached_pages(&twice));
        assert_eq!(twice.len(), 6);
        // Everything is resident now, so nothing more is queued.
        assert_eq!(worker.preload(&[5, 6], ViewMode::Webtoon, Zoom::ONE, VIEWPORT), 0);
    }

    #[test]
    fn out_of_range_requests_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let pages = pages(dir.path(), 2);
        let cache = Arc::new(ImageCache::new(30, 10));
        let worker = PreloadWorker::<RgbBackend>::start(pages, cache.clone(), window()).unwrap();

        assert!(worker.request(PreloadRequest {
            index: 7,
            key: CacheKey::new(dir.path().join("8.png"), ViewMode::Webtoon, Zoom::ONE, VIEWPORT),
        }));
        assert!(worker.wait_idle(DRAIN));
        assert!(cache.is_empty());
        assert!(worker.is_running());
    }

    #[test]
    fn broken_pages_are_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let pages = pages(dir.path(), 3);
        std::fs::write(&pages[1], b"not an image").unwrap();
        let cache = Arc::new(ImageCache::new(30, 10));
        let worker = PreloadWorker::<RgbBackend>::start(pages, cache.clone(), window()).unwrap();

        worker.preload(&[1], ViewMode::Webtoon, Zoom::ONE, VIEWPORT);
        assert!(worker.wait_idle(DRAIN));
        assert_eq!(cache.len(), 2);
    }

    static DECODE_GATE: Mutex<()> = Mutex::new(());

    /// Blocks every decode while a test holds [`DECODE_GATE`].
    struct GatedBackend;

    impl SurfaceBackend for GatedBackend {
        type Surface = (u32, u32);

        fn create_surface(pixels: RgbImage) -> Self::Surface {
            let _open = DECODE_GATE.lock().unwrap_or_else(PoisonError::into_inner);
            pixels.dimensions()
        }
    }

    #[test]
    fn invalidated_requests_never_reach_the_cache() {
        let dir = tempfile::tempdir().unwrap();
        let pages = pages(dir.path(), 8);
        let cache: SharedCache<(u32, u32)> = Arc::new(ImageCache::new(30, 10));
        let worker = PreloadWorker::<GatedBackend>::start(pages, cache.clone(), window()).unwrap();

        let gate = DECODE_GATE.lock().unwrap();
        assert_eq!(worker.preload(&[3], ViewMode::Webtoon, Zoom::ONE, VIEWPORT), 5);
        // The first request may already be stuck in its decode.
        worker.invalidate();
        drop(gate);
        assert!(worker.wait_idle(DRAIN));
        assert!(cache.is_empty());

        assert_eq!(worker.preload(&[3], ViewMode::Webtoon, Zoom::ONE, VIEWPORT), 5);
        assert!(worker.wait_idle(DRAIN));
        assert_eq!(cache.len(), 5);
    }

    #[test]
    fn stopped_worker_accepts_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let pages = pages(dir.path(), 3);
        let cache = Arc::new(ImageCache::new(30, 10));
        let mut worker = PreloadWorker::<RgbBackend>::start(pages, cache.clone(), window()).unwrap();

        worker.stop();
        assert!(!worker.is_running());
        assert_eq!(worker.preload(&[0], ViewMode::Webtoon, Zoom::ONE, VIEWPORT), 0);
        worker.stop();
        assert!(cache.is_empty());
    }
}
