//! Manga renderer: one fitted page at a time with a sliding page turn.

use super::{Placement, fetch_or_load};
use crate::config::ReaderConfig;
use crate::image_cache::{CacheKey, SharedCache};
use crate::image_loader::{LoadedImage, SurfaceBackend};
use crate::state::navigator::{PageNavigator, Transition};
use crate::state::Viewport;
use crate::view_mode::{ViewMode, Zoom, ZoomLimits};
use log::debug;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::Arc;

/// Inset of the placeholder block drawn for an unreadable page.
const PLACEHOLDER_INSET: u32 = 50;

pub struct MangaFrame<S> {
    pub placements: Vec<Placement<S>>,
    pub visible: Vec<usize>,
}

pub struct MangaRenderer<B: SurfaceBackend> {
    pages: Arc<[PathBuf]>,
    cache: SharedCache<B::Surface>,
    viewport: Viewport,
    zoom: Zoom,
    zoom_tolerance: Zoom,
    navigator: PageNavigator,
    _backend: PhantomData<B>,
}

impl<B: SurfaceBackend> MangaRenderer<B> {
    pub fn new(
        pages: Arc<[PathBuf]>,
        cache: SharedCache<B::Surface>,
        viewport: Viewport,
        zoom: Zoom,
        config: &ReaderConfig,
    ) -> Self {
        let navigator = PageNavigator::new(pages.len(), config.transition_speed);
        Self {
            pages,
            cache,
            viewport,
            zoom,
            zoom_tolerance: config.zoom_tolerance(),
            navigator,
            _backend: PhantomData,
        }
    }

    fn page_placement(
        &self,
        index: usize,
        x_shift: i64,
        entry: Option<LoadedImage<B::Surface>>,
    ) -> Placement<B::Surface> {
        let (vw, vh) = (i64::from(self.viewport.width), i64::from(self.viewport.height));
        match entry {
            Some(loaded) => Placement {
                index,
                x: (vw - i64::from(loaded.width)) / 2 + x_shift,
                y: (vh - i64::from(loaded.height)) / 2,
                width: loaded.width,
                height: loaded.height,
                surface: Some(loaded.surface),
            },
            None => Placement {
                index,
                x: i64::from(PLACEHOLDER_INSET) + x_shift,
                y: i64::from(PLACEHOLDER_INSET),
                width: self.viewport.width.saturating_sub(2 * PLACEHOLDER_INSET),
                height: self.viewport.height.saturating_sub(2 * PLACEHOLDER_INSET),
                surface: None,
            },
        }
    }

    fn fetch(&self, index: usize) -> Option<LoadedImage<B::Surface>> {
        let key = CacheKey::new(
            self.pages[index].clone(),
            ViewMode::Manga,
            self.zoom,
            self.viewport,
        );
        fetch_or_load::<B>(&self.cache, key)
    }

    /// Produces the placements for the current page and, mid-turn, the page
    /// sliding in next to it.
    pub fn render(&mut self) -> MangaFrame<B::Surface> {
        if self.pages.is_empty() {
            return MangaFrame {
                placements: Vec::new(),
                visible: Vec::new(),
            };
        }

        let current = self.navigator.current_page();
        let current_entry = self.fetch(current);

        let mut placements = Vec::with_capacity(2);
        let mut visible = vec![current];
        let mut shift = 0;

        if let Transition::Turning {
            direction,
            progress,
        } = self.navigator.transition()
        {
            let width = i64::from(self.viewport.width);
            shift = -((width as f64 * f64::from(progress)).floor() as i64) * direction.sign();
            if let Some(target) = self.navigator.target_page() {
                let entry = self.fetch(target);
                placements.push(self.page_placement(target, shift + width * direction.sign(), entry));
                visible.push(target);
            }
        }

        placements.push(self.page_placement(current, shift, current_entry));
        MangaFrame {
            placements,
            visible,
        }
    }

    /// Steps the page-local zoom; entries far from the new zoom are dropped.
    pub fn zoom_by(&mut self, steps: i32, limits: ZoomLimits) {
        let zoom = self.zoom.stepped(steps, limits);
        if zoom == self.zoom {
            return;
        }
        debug!("Manga zoom {} -> {}", self.zoom, zoom);
        self.zoom = zoom;
        self.cache
            .clear_except_zoom(zoom, ViewMode::Manga, self.zoom_tolerance);
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    pub fn zoom(&self) -> Zoom {
        self.zoom
    }

    pub fn navigator(&self) -> &PageNavigator {
        &self.navigator
    }

    pub fn navigator_mut(&mut self) -> &mut PageNavigator {
        &mut self.navigator
    }

    /// 1-indexed current page.
    pub fn current_page(&self) -> usize {
        if self.pages.is_empty() {
            0
        } else {
            self.navigator.current_page() + 1
        }
    }

    /// Reading progress in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        if self.pages.len() > 1 {
            self.navigator.current_page() as f64 / (self.pages.len() - 1) as f64
        } else {
            1.0
        }
    }

    pub fn at_end(&self) -> bool {
        self.navigator.is_idle() && self.navigator.current_page() + 1 >= self.pages.len()
    }
}
