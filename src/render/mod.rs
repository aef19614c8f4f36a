//! Mode-specific renderers and the dispatch between them.
//!
//! Renderers do not draw. Each frame they produce placements: where every
//! visible page goes and which surface, if any, to blit there. A placement
//! without a surface is drawn as a gray placeholder block.

pub mod manga;
pub mod webtoon;

pub use manga::MangaRenderer;
pub use webtoon::{PageSizes, WebtoonRenderer};

use crate::file_utils::PathExt;
use crate::image_cache::{CacheKey, ImageCache};
use crate::image_loader::{LoadedImage, SurfaceBackend, load_image};
use crate::state::Viewport;
use crate::view_mode::{ViewMode, Zoom, ZoomLimits};
use log::warn;

/// One page positioned in viewport coordinates.
#[derive(Debug, Clone)]
pub struct Placement<S> {
    /// 0-indexed page
    pub index: usize,
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
    pub surface: Option<S>,
}

/// Decodes the page behind `key` synchronously and caches the result.
///
/// Decode failures are logged and yield `None`; nothing is cached for them,
/// so the next miss tries again.
pub(crate) fn load_into_cache<B: SurfaceBackend>(
    cache: &ImageCache<B::Surface>,
    key: CacheKey,
) -> Option<LoadedImage<B::Surface>> {
    match load_image::<B>(key.page(), key.viewport(), key.zoom(), key.mode()) {
        Ok(loaded) => {
            cache.put(key, loaded.clone());
            Some(loaded)
        }
        Err(e) => {
            warn!("Showing placeholder for {}: {}", key.page().format_for_log(), e);
            None
        }
    }
}

/// Cache hit, or a synchronous decode on miss.
pub(crate) fn fetch_or_load<B: SurfaceBackend>(
    cache: &ImageCache<B::Surface>,
    key: CacheKey,
) -> Option<LoadedImage<B::Surface>> {
    cache
        .get(&key)
        .or_else(|| load_into_cache::<B>(cache, key))
}

/// Everything a frame produced.
pub struct Frame<S> {
    pub mode: ViewMode,
    pub placements: Vec<Placement<S>>,
    /// 0-indexed pages on screen, in order.
    pub visible: Vec<usize>,
    /// 1-indexed page reported as the reading position.
    pub current_page: usize,
    pub total_pages: usize,
    /// Reading progress in `[0, 1]`.
    pub progress: f64,
}

/// The active renderer, carrying its mode-specific state.
pub enum Renderer<B: SurfaceBackend> {
    Webtoon(WebtoonRenderer<B>),
    Manga(MangaRenderer<B>),
}

impl<B: SurfaceBackend> Renderer<B> {
    pub fn mode(&self) -> ViewMode {
        match self {
            Renderer::Webtoon(_) => ViewMode::Webtoon,
            Renderer::Manga(_) => ViewMode::Manga,
        }
    }

    pub fn zoom(&self) -> Zoom {
        match self {
            Renderer::Webtoon(r) => r.zoom(),
            Renderer::Manga(r) => r.zoom(),
        }
    }

    /// Advances per-frame animation, then renders.
    pub fn render(&mut self, total_pages: usize) -> Frame<B::Surface> {
        let mode = self.mode();
        let (placements, visible) = match self {
            Renderer::Webtoon(r) => {
                let frame = r.render();
                (frame.placements, frame.visible)
            }
            Renderer::Manga(r) => {
                r.navigator_mut().update_transition();
                let frame = r.render();
                (frame.placements, frame.visible)
            }
        };

        Frame {
            mode,
            placements,
            visible,
            current_page: self.current_page(),
            total_pages,
            progress: self.progress(),
        }
    }

    pub fn zoom_by(&mut self, steps: i32, limits: ZoomLimits) {
        match self {
            Renderer::Webtoon(r) => r.zoom_by(steps, limits),
            Renderer::Manga(r) => r.zoom_by(steps, limits),
        }
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        match self {
            Renderer::Webtoon(r) => r.set_viewport(viewport),
            Renderer::Manga(r) => r.set_viewport(viewport),
        }
    }

    pub fn current_page(&self) -> usize {
        match self {
            Renderer::Webtoon(r) => r.current_page(),
            Renderer::Manga(r) => r.current_page(),
        }
    }

    pub fn progress(&self) -> f64 {
        match self {
            Renderer::Webtoon(r) => r.progress(),
            Renderer::Manga(r) => r.progress(),
        }
    }

    pub fn at_end(&self) -> bool {
        match self {
            Renderer::Webtoon(r) => r.at_end(),
            Renderer::Manga(r) => r.at_end(),
        }
    }
}
