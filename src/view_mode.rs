//! Viewing modes, zoom levels and initial mode detection.

use crate::config::WEBTOON_ASPECT_THRESHOLD;
use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How pages are presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    /// Continuous vertical scroll, pages stacked at a width-driven scale.
    Webtoon,
    /// One page at a time, fit to the viewport.
    Manga,
}

impl ViewMode {
    pub fn toggled(self) -> Self {
        match self {
            ViewMode::Webtoon => ViewMode::Manga,
            ViewMode::Manga => ViewMode::Webtoon,
        }
    }
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewMode::Webtoon => write!(f, "webtoon"),
            ViewMode::Manga => write!(f, "manga"),
        }
    }
}

/// A zoom factor rounded to two decimal places, stored in hundredths.
///
/// Rounding happens at construction, so two factors that print the same
/// compare equal and hash the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Zoom(u32);

impl Zoom {
    pub const ONE: Zoom = Zoom(100);

    pub fn from_factor(factor: f32) -> Self {
        Zoom((factor.max(0.0) * 100.0).round() as u32)
    }

    pub const fn from_hundredths(hundredths: u32) -> Self {
        Zoom(hundredths)
    }

    pub fn hundredths(self) -> u32 {
        self.0
    }

    pub fn factor(self) -> f64 {
        f64::from(self.0) / 100.0
    }

    /// Absolute distance between two zoom levels.
    pub fn distance(self, other: Zoom) -> Zoom {
        Zoom(self.0.abs_diff(other.0))
    }

    /// Moves `steps` increments up (positive) or down (negative), clamped to `limits`.
    pub fn stepped(self, steps: i32, limits: ZoomLimits) -> Zoom {
        let moved = i64::from(self.0) + i64::from(steps) * i64::from(limits.step.0);
        Zoom(moved.clamp(i64::from(limits.min.0), i64::from(limits.max.0)) as u32)
    }
}

impl Default for Zoom {
    fn default() -> Self {
        Zoom::ONE
    }
}

impl fmt::Display for Zoom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

/// Allowed zoom range and the increment used by zoom-in/zoom-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoomLimits {
    pub min: Zoom,
    pub max: Zoom,
    pub step: Zoom,
}

/// Picks the initial mode from the pages' native sizes.
///
/// Each readable page votes: taller than three times its width votes webtoon,
/// anything else votes manga. Unreadable pages abstain and ties go to webtoon.
pub fn detect_mode(sizes: &[Option<(u32, u32)>]) -> ViewMode {
    let (webtoon, manga) = sizes
        .par_iter()
        .filter_map(|size| *size)
        .map(|(w, h)| {
            if u64::from(h) > u64::from(WEBTOON_ASPECT_THRESHOLD) * u64::from(w) {
                (1usize, 0usize)
            } else {
                (0, 1)
            }
        })
        .reduce(|| (0, 0), |a, b| (a.0 + b.0, a.1 + b.1));

    debug!("Mode votes: webtoon={} manga={}", webtoon, manga);
    if webtoon >= manga {
        ViewMode::Webtoon
    } else {
        ViewMode::Manga
    }
}
