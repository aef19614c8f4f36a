//! Reader configuration: compile-time constants plus runtime tunables.

use crate::error::{AppError, Result};
use crate::file_utils::PathExt;
use crate::view_mode::{Zoom, ZoomLimits};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Supported image file extensions for scanning directories.
pub const SUPPORTED_IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "gif", "bmp", "webp"];

/// Webtoon pages are laid out at this percentage of the viewport width (before zoom).
pub const WEBTOON_WIDTH_PERCENT: u64 = 40;

/// Manga pages fit inside the viewport scaled down by this margin.
pub const MANGA_FIT_MARGIN: f64 = 0.9;

/// Vertical gap between stacked webtoon pages, in pixels.
pub const PAGE_GAP: u32 = 5;

/// Height assigned to a webtoon page whose size is still unknown.
pub const PLACEHOLDER_HEIGHT: u32 = 250;

/// Height assigned to a webtoon page whose measurement decode failed.
pub const FAILED_PAGE_HEIGHT: u32 = 1000;

/// Pages taller than this multiple of their width vote for webtoon mode.
pub const WEBTOON_ASPECT_THRESHOLD: u32 = 3;

/// Runtime tunables. Every field falls back to its default when absent from the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Maximum number of decoded surfaces held by the cache.
    pub cache_capacity: usize,
    /// Number of least-recently-used entries dropped per eviction pass.
    pub eviction_batch: usize,
    /// Pages preloaded before the first visible page.
    pub preload_before: usize,
    /// Pages preloaded after the last visible page.
    pub preload_after: usize,
    /// Pages at the head of the sequence decoded during layout when no size is known.
    pub layout_decode_head: usize,
    pub zoom_min: f32,
    pub zoom_max: f32,
    pub zoom_step: f32,
    /// Cached entries within this zoom distance survive a layout recompute.
    pub zoom_tolerance: f32,
    pub webtoon_zoom: f32,
    pub manga_zoom: f32,
    /// Progress added to a page-turn transition per frame.
    pub transition_speed: f32,
    /// Preload worker queue wait before it re-checks the running flag.
    pub poll_interval_ms: u64,
    pub scroll_base_speed: u32,
    /// Minimum spacing between two non-forced progress writes.
    pub progress_interval_ms: u64,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 30,
            eviction_batch: 10,
            preload_before: 5,
            preload_after: 5,
            layout_decode_head: 3,
            zoom_min: 0.6,
            zoom_max: 1.5,
            zoom_step: 0.2,
            zoom_tolerance: 0.2,
            webtoon_zoom: 1.0,
            manga_zoom: 1.0,
            transition_speed: 0.05,
            poll_interval_ms: 100,
            scroll_base_speed: 100,
            progress_interval_ms: 1000,
            viewport_width: 1280,
            viewport_height: 800,
        }
    }
}

impl ReaderConfig {
    /// Loads the configuration from a JSON file.
    ///
    /// A missing file is not an error: the defaults are returned instead.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(
                "No configuration at {}, using defaults",
                path.format_for_log()
            );
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("{}: {}", path.format_for_log(), e)))?;
        let config: ReaderConfig = serde_json::from_str(&text)?;
        Ok(config.validated())
    }

    /// Clamps values that would break the engine's invariants.
    pub fn validated(mut self) -> Self {
        if self.cache_capacity == 0 {
            warn!("cache_capacity must be at least 1, using 1");
            self.cache_capacity = 1;
        }
        if self.eviction_batch == 0 {
            warn!("eviction_batch must be at least 1, using 1");
            self.eviction_batch = 1;
        }
        if self.zoom_min > self.zoom_max {
            warn!(
                "zoom_min {} exceeds zoom_max {}, swapping",
                self.zoom_min, self.zoom_max
            );
            std::mem::swap(&mut self.zoom_min, &mut self.zoom_max);
        }
        if !(self.transition_speed > 0.0) {
            warn!("transition_speed must be positive, using default");
            self.transition_speed = Self::default().transition_speed;
        }
        self
    }

    pub fn zoom_limits(&self) -> ZoomLimits {
        ZoomLimits {
            min: Zoom::from_factor(self.zoom_min),
            max: Zoom::from_factor(self.zoom_max),
            step: Zoom::from_factor(self.zoom_step),
        }
    }

    pub fn zoom_tolerance(&self) -> Zoom {
        Zoom::from_factor(self.zoom_tolerance)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}
