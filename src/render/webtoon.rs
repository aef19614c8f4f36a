//! Webtoon renderer: lazily-sized page stack plus the scroll position over it.

use super::{Placement, load_into_cache};
use crate::config::{FAILED_PAGE_HEIGHT, PLACEHOLDER_HEIGHT, ReaderConfig};
use crate::file_utils::PathExt;
use crate::image_cache::{CacheKey, SharedCache};
use crate::image_loader::{SurfaceBackend, load_image, webtoon_height, webtoon_target_width};
use crate::layout::{Provenance, WebtoonLayout, scroll_speed};
use crate::state::Viewport;
use crate::view_mode::{ViewMode, Zoom, ZoomLimits};
use log::{debug, warn};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::Arc;

/// Everything known about page sizes, independent of zoom and viewport.
#[derive(Debug, Clone, Default)]
pub struct PageSizes {
    /// Native `(width, height)` read from headers, when available.
    native: Arc<[Option<(u32, u32)>]>,
    /// Heights learned by decoding, keyed by `(page index, page width)`.
    measured: HashMap<(usize, u32), u32>,
}

impl PageSizes {
    pub fn new(native: Arc<[Option<(u32, u32)>]>) -> Self {
        Self {
            native,
            measured: HashMap::new(),
        }
    }

    /// Height of page `index` at `page_width`, if known without decoding.
    fn known_height(&self, index: usize, page_width: u32) -> Option<u32> {
        if let Some(&height) = self.measured.get(&(index, page_width)) {
            return Some(height);
        }
        self.native
            .get(index)
            .copied()
            .flatten()
            .filter(|&(w, _)| w > 0)
            .map(|native| webtoon_height(native, page_width))
    }

    fn record(&mut self, index: usize, page_width: u32, height: u32) {
        self.measured.insert((index, page_width), height);
    }
}

/// Output of one webtoon frame.
pub struct WebtoonFrame<S> {
    pub placements: Vec<Placement<S>>,
    pub visible: Vec<usize>,
}

pub struct WebtoonRenderer<B: SurfaceBackend> {
    pages: Arc<[PathBuf]>,
    sizes: PageSizes,
    cache: SharedCache<B::Surface>,
    viewport: Viewport,
    layout: WebtoonLayout,
    scroll: u32,
    /// A page height changed during the last frame; relayout before the next.
    dirty: bool,
    decode_head: usize,
    zoom_tolerance: Zoom,
    scroll_base_speed: u32,
    _backend: PhantomData<B>,
}

impl<B: SurfaceBackend> WebtoonRenderer<B> {
    pub fn new(
        pages: Arc<[PathBuf]>,
        sizes: PageSizes,
        cache: SharedCache<B::Surface>,
        viewport: Viewport,
        zoom: Zoom,
        config: &ReaderConfig,
    ) -> Self {
        let mut renderer = Self {
            pages,
            sizes,
            cache,
            viewport,
            layout: WebtoonLayout::default(),
            scroll: 0,
            dirty: false,
            decode_head: config.layout_decode_head,
            zoom_tolerance: config.zoom_tolerance(),
            scroll_base_speed: config.scroll_base_speed,
            _backend: PhantomData,
        };
        renderer.calculate_layout(zoom);
        renderer
    }

    /// Hands the learned page sizes back, e.g. when switching to manga mode.
    pub fn into_sizes(self) -> PageSizes {
        self.sizes
    }

    /// Recomputes every page position at `zoom`.
    ///
    /// Heights come from earlier measurements, then header metadata, then a
    /// full decode for the first few unknown pages, then a placeholder.
    /// Cache entries for other modes or far-away zooms are dropped.
    pub fn calculate_layout(&mut self, zoom: Zoom) {
        self.relayout(zoom, self.decode_head);
    }

    /// Lays out every page, decoding at most `decode_budget` pages whose
    /// height is still unknown.
    fn relayout(&mut self, zoom: Zoom, decode_budget: usize) {
        let start = std::time::Instant::now();
        let page_width = webtoon_target_width(self.viewport.width, zoom);
        let mut decoded = 0;

        let mut heights = Vec::with_capacity(self.pages.len());
        for index in 0..self.pages.len() {
            let entry = if let Some(height) = self.sizes.known_height(index, page_width) {
                (height, Provenance::Measured)
            } else if decoded < decode_budget {
                decoded += 1;
                (self.measure(index, zoom, page_width), Provenance::Measured)
            } else {
                (PLACEHOLDER_HEIGHT, Provenance::Estimated)
            };
            heights.push(entry);
        }

        self.layout = WebtoonLayout::build(zoom, page_width, heights);
        self.dirty = false;
        self.cache
            .clear_except_zoom(zoom, ViewMode::Webtoon, self.zoom_tolerance);
        debug!(
            "Webtoon layout @{}: {} pages, {} px tall, {} decoded, in {:?}",
            zoom,
            self.pages.len(),
            self.layout.total_height(),
            decoded,
            start.elapsed()
        );
    }

    /// Decodes page `index` to learn its height, keeping the surface in the cache.
    fn measure(&mut self, index: usize, zoom: Zoom, page_width: u32) -> u32 {
        let path = &self.pages[index];
        let height = match load_image::<B>(path, self.viewport, zoom, ViewMode::Webtoon) {
            Ok(loaded) => {
                let height = loaded.height;
                let key = CacheKey::new(path.clone(), ViewMode::Webtoon, zoom, self.viewport);
                self.cache.put(key, loaded);
                height
            }
            Err(e) => {
                warn!("Cannot measure {}: {}", path.format_for_log(), e);
                FAILED_PAGE_HEIGHT
            }
        };
        self.sizes.record(index, page_width, height);
        height
    }

    /// Produces the placements for the current scroll position.
    ///
    /// A layout left dirty by the previous frame is recomputed first, from
    /// known heights only, with the page at the top of the viewport held in
    /// place. At most one still-estimated page is decoded per frame; later
    /// estimated pages show whatever the cache holds, or a placeholder.
    pub fn render(&mut self) -> WebtoonFrame<B::Surface> {
        if self.dirty {
            let anchor = self.layout.anchor_at(self.scroll);
            let zoom = self.layout.zoom();
            self.relayout(zoom, 0);
            self.scroll = self.layout.resolve(anchor, self.viewport.height);
        }

        let zoom = self.layout.zoom();
        let page_width = self.layout.page_width();
        let visible = self.layout.visible_indices(self.scroll, self.viewport.height);
        let mut measured_this_frame = false;
        let mut placements = Vec::with_capacity(visible.len());

        for &index in &visible {
            let Some(slot) = self.layout.slot(index) else {
                continue;
            };
            let key = CacheKey::new(self.pages[index].clone(), ViewMode::Webtoon, zoom, self.viewport);
            let estimated = slot.provenance == Provenance::Estimated;
            let mut attempted_measure = false;
            let entry = match self.cache.get(&key) {
                Some(hit) => Some(hit),
                None if estimated && measured_this_frame => None,
                None => {
                    if estimated {
                        measured_this_frame = true;
                        attempted_measure = true;
                    }
                    load_into_cache::<B>(&self.cache, key)
                }
            };

            match &entry {
                Some(loaded) if loaded.height != slot.height => {
                    debug!(
                        "Page {} measured {} px (layout had {})",
                        index + 1,
                        loaded.height,
                        slot.height
                    );
                    self.sizes.record(index, page_width, loaded.height);
                    self.dirty = true;
                }
                None if attempted_measure => {
                    self.sizes.record(index, page_width, FAILED_PAGE_HEIGHT);
                    self.dirty = true;
                }
                _ => {}
            }

            let (width, height) = entry
                .as_ref()
                .map(|loaded| (loaded.width, loaded.height))
                .unwrap_or((page_width, slot.height));
            placements.push(Placement {
                index,
                x: (i64::from(self.viewport.width) - i64::from(width)) / 2,
                y: i64::from(slot.offset) - i64::from(self.scroll),
                width,
                height,
                surface: entry.map(|loaded| loaded.surface),
            });
        }

        WebtoonFrame {
            placements,
            visible,
        }
    }

    /// Changes zoom while keeping the page at the top of the viewport in place.
    pub fn set_zoom(&mut self, zoom: Zoom) {
        if zoom == self.layout.zoom() {
            return;
        }
        let anchor = self.layout.anchor_at(self.scroll);
        debug!(
            "Zoom {} -> {} anchored on page {} at {:.3}",
            self.layout.zoom(),
            zoom,
            anchor.page + 1,
            anchor.ratio
        );
        self.calculate_layout(zoom);
        self.scroll = self.layout.resolve(anchor, self.viewport.height);
    }

    /// Steps zoom in (positive) or out (negative) within `limits`.
    pub fn zoom_by(&mut self, steps: i32, limits: ZoomLimits) {
        let zoom = self.layout.zoom().stepped(steps, limits);
        self.set_zoom(zoom);
    }

    /// Adopts a new viewport size, keeping the top page in place.
    pub fn set_viewport(&mut self, viewport: Viewport) {
        let anchor = self.layout.anchor_at(self.scroll);
        self.viewport = viewport;
        let zoom = self.layout.zoom();
        self.calculate_layout(zoom);
        self.scroll = self.layout.resolve(anchor, viewport.height);
    }

    pub fn max_scroll(&self) -> u32 {
        self.layout.max_scroll(self.viewport.height)
    }

    /// Moves the scroll position by `delta` pixels, clamped to the content.
    pub fn scroll_by(&mut self, delta: i64) {
        let target = i64::from(self.scroll) + delta;
        self.scroll = target.clamp(0, i64::from(self.max_scroll())) as u32;
    }

    pub fn scroll_to(&mut self, offset: u32) {
        self.scroll = offset.min(self.max_scroll());
    }

    /// Scrolls by `steps` wheel notches at the zoom-dependent speed.
    pub fn wheel(&mut self, steps: i32) {
        let speed = scroll_speed(self.layout.zoom(), self.scroll_base_speed);
        self.scroll_by(i64::from(steps) * i64::from(speed) * 2);
    }

    pub fn page_down(&mut self) {
        self.scroll_by(i64::from(self.viewport.height));
    }

    pub fn page_up(&mut self) {
        self.scroll_by(-i64::from(self.viewport.height));
    }

    /// Scrolls so that `page` (0-indexed, clamped) starts at the top.
    pub fn go_to_page(&mut self, page: usize) {
        let offset = self.layout.page_offset(page);
        self.scroll_to(offset);
    }

    pub fn scroll(&self) -> u32 {
        self.scroll
    }

    pub fn zoom(&self) -> Zoom {
        self.layout.zoom()
    }

    pub fn layout(&self) -> &WebtoonLayout {
        &self.layout
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// 1-indexed page at the viewport centre.
    pub fn current_page(&self) -> usize {
        self.layout.page_from_offset(self.scroll, self.viewport.height)
    }

    /// Reading progress in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        let max = self.max_scroll();
        if max == 0 {
            1.0
        } else {
            (f64::from(self.scroll) / f64::from(max)).min(1.0)
        }
    }

    pub fn at_end(&self) -> bool {
        self.scroll >= self.max_scroll()
    }
}
