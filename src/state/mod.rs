//! State management for a reading session.
//!
//! [`ReaderSession`] owns everything the render thread touches: the active
//! renderer, the viewport and the per-mode zoom levels. The cache is the only
//! piece it shares, with the preload worker.

use crate::config::ReaderConfig;
use crate::error::Result;
use crate::file_utils::{PathExt, scan_page_sizes, scan_pages};
use crate::image_cache::{CacheStats, ImageCache, SharedCache};
use crate::image_loader::SurfaceBackend;
use crate::preload::{PreloadWindow, PreloadWorker};
use crate::render::{Frame, MangaRenderer, PageSizes, Renderer, WebtoonRenderer};
use crate::services::ProgressReporter;
use crate::view_mode::{ViewMode, Zoom, detect_mode};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub mod navigator;
pub mod viewport;

pub use navigator::PageNavigator;
pub use viewport::Viewport;

/// One open page sequence and the input handlers acting on it.
pub struct ReaderSession<B: SurfaceBackend> {
    config: ReaderConfig,
    pages: Arc<[PathBuf]>,
    native_sizes: Arc<[Option<(u32, u32)>]>,
    cache: SharedCache<B::Surface>,
    preloader: PreloadWorker<B>,
    renderer: Renderer<B>,
    /// Page sizes learned in webtoon mode, kept while manga mode is active.
    parked_sizes: Option<PageSizes>,
    viewport: Viewport,
    webtoon_zoom: Zoom,
    manga_zoom: Zoom,
    progress: Option<ProgressReporter>,
}

impl<B: SurfaceBackend> ReaderSession<B> {
    /// Opens a session over `pages` in `mode`.
    ///
    /// `native_sizes` holds header dimensions per page, `None` where unknown.
    pub fn open(
        pages: Vec<PathBuf>,
        mut native_sizes: Vec<Option<(u32, u32)>>,
        mode: ViewMode,
        config: ReaderConfig,
    ) -> Result<Self> {
        let config = config.validated();
        if native_sizes.len() != pages.len() {
            warn!(
                "{} page sizes for {} pages, unknown sizes will be estimated",
                native_sizes.len(),
                pages.len()
            );
            native_sizes.resize(pages.len(), None);
        }

        let pages: Arc<[PathBuf]> = pages.into();
        let native_sizes: Arc<[Option<(u32, u32)>]> = native_sizes.into();
        let cache: SharedCache<B::Surface> =
            Arc::new(ImageCache::new(config.cache_capacity, config.eviction_batch));
        let preloader = PreloadWorker::start(
            pages.clone(),
            cache.clone(),
            PreloadWindow {
                before: config.preload_before,
                after: config.preload_after,
                poll_interval: config.poll_interval(),
            },
        )?;

        let limits = config.zoom_limits();
        let webtoon_zoom = Zoom::from_factor(config.webtoon_zoom).stepped(0, limits);
        let manga_zoom = Zoom::from_factor(config.manga_zoom).stepped(0, limits);
        let viewport = Viewport::new(config.viewport_width.max(1), config.viewport_height.max(1));

        let (renderer, parked_sizes) = match mode {
            ViewMode::Webtoon => (
                Renderer::Webtoon(WebtoonRenderer::new(
                    pages.clone(),
                    PageSizes::new(native_sizes.clone()),
                    cache.clone(),
                    viewport,
                    webtoon_zoom,
                    &config,
                )),
                None,
            ),
            ViewMode::Manga => (
                Renderer::Manga(MangaRenderer::new(
                    pages.clone(),
                    cache.clone(),
                    viewport,
                    manga_zoom,
                    &config,
                )),
                Some(PageSizes::new(native_sizes.clone())),
            ),
        };

        info!("Opened {} pages in {} mode", pages.len(), mode);
        Ok(Self {
            config,
            pages,
            native_sizes,
            cache,
            preloader,
            renderer,
            parked_sizes,
            viewport,
            webtoon_zoom,
            manga_zoom,
            progress: None,
        })
    }

    /// Scans `dir` for pages, reads their sizes and picks the mode from them.
    pub fn open_dir(dir: &Path, config: ReaderConfig) -> Result<Self> {
        let pages = scan_pages(dir)?;
        let sizes = scan_page_sizes(&pages);
        let mode = detect_mode(&sizes);
        debug!("Detected {} mode for {}", mode, dir.format_for_log());
        Self::open(pages, sizes, mode, config)
    }

    /// Starts reporting progress and reopens at the stored page.
    pub fn attach_progress(&mut self, reporter: ProgressReporter) {
        let page = reporter.resume_page();
        if page > 1 {
            info!("Resuming at page {}", page);
            self.jump_to_page(page);
        }
        self.progress = Some(reporter);
    }

    /// Renders one frame and schedules preloading around what it shows.
    ///
    /// In manga mode the page-turn animation advances by one step first.
    pub fn render_frame(&mut self) -> Frame<B::Surface> {
        let frame = self.renderer.render(self.pages.len());
        self.preloader
            .preload(&frame.visible, frame.mode, self.renderer.zoom(), self.viewport);
        if let Some(reporter) = self.progress.as_mut() {
            reporter.report(frame.current_page, frame.total_pages);
        }
        frame
    }

    /// Scrolls the webtoon stack by `delta` pixels.
    pub fn scroll_by(&mut self, delta: i64) {
        match &mut self.renderer {
            Renderer::Webtoon(r) => r.scroll_by(delta),
            Renderer::Manga(_) => debug!("Scroll ignored in manga mode"),
        }
    }

    /// Mouse wheel: scrolls in webtoon mode, turns pages in manga mode.
    pub fn wheel(&mut self, steps: i32) {
        match &mut self.renderer {
            Renderer::Webtoon(r) => r.wheel(steps),
            Renderer::Manga(r) => {
                if steps > 0 {
                    r.navigator_mut().next_page();
                } else if steps < 0 {
                    r.navigator_mut().prev_page();
                }
            }
        }
    }

    /// Zooms in (positive) or out (negative) by whole steps.
    pub fn zoom_by(&mut self, steps: i32) {
        self.renderer.zoom_by(steps, self.config.zoom_limits());
        let zoom = self.renderer.zoom();
        match self.renderer.mode() {
            ViewMode::Webtoon => self.webtoon_zoom = zoom,
            ViewMode::Manga => self.manga_zoom = zoom,
        }
    }

    /// Adopts a new viewport size. Every cached surface was sized for the old
    /// viewport, so the cache is emptied and queued preloads are dropped.
    pub fn resize(&mut self, width: u32, height: u32) {
        let viewport = Viewport::new(width.max(1), height.max(1));
        if viewport == self.viewport {
            return;
        }
        debug!(
            "Resize {}x{} -> {}x{}",
            self.viewport.width, self.viewport.height, viewport.width, viewport.height
        );
        self.viewport = viewport;
        self.preloader.invalidate();
        self.cache.clear();
        self.renderer.set_viewport(viewport);
    }

    /// Switches between webtoon and manga mode, staying on the current page.
    pub fn toggle_mode(&mut self) {
        let page = self.renderer.current_page().max(1);
        let mode = self.renderer.mode().toggled();

        let next = match mode {
            ViewMode::Manga => {
                let mut manga = MangaRenderer::new(
                    self.pages.clone(),
                    self.cache.clone(),
                    self.viewport,
                    self.manga_zoom,
                    &self.config,
                );
                manga.navigator_mut().go_to_page(page - 1);
                self.cache.clear_except_zoom(
                    self.manga_zoom,
                    ViewMode::Manga,
                    self.config.zoom_tolerance(),
                );
                Renderer::Manga(manga)
            }
            ViewMode::Webtoon => {
                let sizes = self
                    .parked_sizes
                    .take()
                    .unwrap_or_else(|| PageSizes::new(self.native_sizes.clone()));
                let mut webtoon = WebtoonRenderer::new(
                    self.pages.clone(),
                    sizes,
                    self.cache.clone(),
                    self.viewport,
                    self.webtoon_zoom,
                    &self.config,
                );
                webtoon.go_to_page(page - 1);
                Renderer::Webtoon(webtoon)
            }
        };

        if let Renderer::Webtoon(previous) = std::mem::replace(&mut self.renderer, next) {
            self.parked_sizes = Some(previous.into_sizes());
        }
        info!("Switched to {} mode at page {}", mode, page);
    }

    /// Jumps to `page` (1-indexed, clamped to the sequence).
    pub fn jump_to_page(&mut self, page: usize) {
        if self.pages.is_empty() {
            return;
        }
        let index = page.clamp(1, self.pages.len()) - 1;
        match &mut self.renderer {
            Renderer::Webtoon(r) => r.go_to_page(index),
            Renderer::Manga(r) => {
                if !r.navigator_mut().go_to_page(index) {
                    debug!("Jump to page {} refused during a page turn", page);
                }
            }
        }
    }

    pub fn next_page(&mut self) {
        match &mut self.renderer {
            Renderer::Webtoon(r) => {
                let current = r.current_page();
                r.go_to_page(current);
            }
            Renderer::Manga(r) => {
                r.navigator_mut().next_page();
            }
        }
    }

    pub fn prev_page(&mut self) {
        match &mut self.renderer {
            Renderer::Webtoon(r) => {
                let current = r.current_page();
                r.go_to_page(current.saturating_sub(2));
            }
            Renderer::Manga(r) => {
                r.navigator_mut().prev_page();
            }
        }
    }

    /// Scrolls down one viewport, or turns to the next page.
    pub fn page_down(&mut self) {
        match &mut self.renderer {
            Renderer::Webtoon(r) => r.page_down(),
            Renderer::Manga(r) => {
                r.navigator_mut().next_page();
            }
        }
    }

    /// Scrolls up one viewport, or turns to the previous page.
    pub fn page_up(&mut self) {
        match &mut self.renderer {
            Renderer::Webtoon(r) => r.page_up(),
            Renderer::Manga(r) => {
                r.navigator_mut().prev_page();
            }
        }
    }

    pub fn home(&mut self) {
        match &mut self.renderer {
            Renderer::Webtoon(r) => r.scroll_to(0),
            Renderer::Manga(r) => {
                r.navigator_mut().go_to_page(0);
            }
        }
    }

    pub fn end(&mut self) {
        match &mut self.renderer {
            Renderer::Webtoon(r) => {
                let max = r.max_scroll();
                r.scroll_to(max);
            }
            Renderer::Manga(r) => {
                r.navigator_mut().go_to_page(usize::MAX);
            }
        }
    }

    /// Flushes progress and stops the preload worker. Safe to call twice.
    pub fn close(&mut self) {
        if let Some(reporter) = self.progress.as_mut() {
            reporter.flush();
        }
        self.preloader.stop();
    }

    pub fn mode(&self) -> ViewMode {
        self.renderer.mode()
    }

    pub fn zoom(&self) -> Zoom {
        self.renderer.zoom()
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// 1-indexed reading position.
    pub fn current_page(&self) -> usize {
        self.renderer.current_page()
    }

    pub fn progress(&self) -> f64 {
        self.renderer.progress()
    }

    pub fn at_end(&self) -> bool {
        self.renderer.at_end()
    }

    /// Webtoon scroll offset; `None` in manga mode.
    pub fn scroll(&self) -> Option<u32> {
        match &self.renderer {
            Renderer::Webtoon(r) => Some(r.scroll()),
            Renderer::Manga(_) => None,
        }
    }

    pub fn renderer(&self) -> &Renderer<B> {
        &self.renderer
    }

    pub fn cache(&self) -> &SharedCache<B::Surface> {
        &self.cache
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn preloader(&self) -> &PreloadWorker<B> {
        &self.preloader
    }

    pub fn progress_reporter(&self) -> Option<&ProgressReporter> {
        self.progress.as_ref()
    }
}

impl<B: SurfaceBackend> Drop for ReaderSession<B> {
    fn drop(&mut self) {
        self.close();
    }
}
