//! Vertical page stacking for webtoon mode, and the scroll re-anchoring used
//! when zoom or viewport changes move every page.

use crate::config::PAGE_GAP;
use crate::view_mode::Zoom;
use log::warn;
use std::ops::Range;

/// Where a page's height came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Placeholder height, pending measurement.
    Estimated,
    /// True height from a decode or from header metadata.
    Measured,
}

/// Position of one page in the stacked layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSlot {
    pub offset: u32,
    pub height: u32,
    pub provenance: Provenance,
}

/// Stacked page positions at one zoom level.
///
/// `slots[i + 1].offset == slots[i].offset + slots[i].height + PAGE_GAP`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WebtoonLayout {
    zoom: Zoom,
    page_width: u32,
    slots: Vec<PageSlot>,
    total_height: u32,
}

impl WebtoonLayout {
    /// Stacks pages of the given heights in order.
    pub fn build(
        zoom: Zoom,
        page_width: u32,
        heights: impl IntoIterator<Item = (u32, Provenance)>,
    ) -> Self {
        let mut offset: u32 = 0;
        let slots = heights
            .into_iter()
            .map(|(height, provenance)| {
                let slot = PageSlot {
                    offset,
                    height,
                    provenance,
                };
                offset = offset.saturating_add(height).saturating_add(PAGE_GAP);
                slot
            })
            .collect();

        Self {
            zoom,
            page_width,
            slots,
            total_height: offset,
        }
    }

    pub fn zoom(&self) -> Zoom {
        self.zoom
    }

    pub fn page_width(&self) -> u32 {
        self.page_width
    }

    pub fn total_height(&self) -> u32 {
        self.total_height
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slot(&self, index: usize) -> Option<PageSlot> {
        self.slots.get(index).copied()
    }

    pub fn slots(&self) -> &[PageSlot] {
        &self.slots
    }

    /// Largest scroll offset that still fills the viewport.
    pub fn max_scroll(&self, viewport_height: u32) -> u32 {
        self.total_height.saturating_sub(viewport_height)
    }

    /// Pages whose `[offset, offset + height]` touches
    /// `[scroll, scroll + viewport_height]`, as a contiguous range.
    pub fn visible_range(&self, scroll: u32, viewport_height: u32) -> Range<usize> {
        let bottom = u64::from(scroll) + u64::from(viewport_height);
        let start = self
            .slots
            .partition_point(|slot| u64::from(slot.offset) + u64::from(slot.height) < u64::from(scroll));
        let end = self
            .slots
            .partition_point(|slot| u64::from(slot.offset) <= bottom);
        start..end.max(start)
    }

    pub fn visible_indices(&self, scroll: u32, viewport_height: u32) -> Vec<usize> {
        self.visible_range(scroll, viewport_height).collect()
    }

    /// 1-indexed page shown at the vertical centre of the viewport: the last
    /// page whose top is at or above the centre line. 0 for an empty layout.
    pub fn page_from_offset(&self, scroll: u32, viewport_height: u32) -> usize {
        if self.slots.is_empty() {
            return 0;
        }
        let center = u64::from(scroll) + u64::from(viewport_height / 2);
        self.slots
            .partition_point(|slot| u64::from(slot.offset) <= center)
            .clamp(1, self.slots.len())
    }

    /// Top offset of a page, for jumps. Out-of-range pages clamp to the last one.
    pub fn page_offset(&self, index: usize) -> u32 {
        self.slots
            .get(index.min(self.slots.len().saturating_sub(1)))
            .map(|slot| slot.offset)
            .unwrap_or(0)
    }

    /// Converts a scroll offset into the page at the top of the viewport and
    /// the fraction of that page already scrolled past.
    pub fn anchor_at(&self, scroll: u32) -> ScrollAnchor {
        let Some(first) = self.slots.first() else {
            return ScrollAnchor::default();
        };
        if scroll < first.offset {
            warn!("Scroll offset {} above first page, anchoring to its top", scroll);
            return ScrollAnchor::default();
        }

        let page = self.slots.partition_point(|slot| slot.offset <= scroll) - 1;
        let slot = self.slots[page];
        let ratio = f64::from(scroll - slot.offset) / f64::from(slot.height.max(1));
        ScrollAnchor { page, ratio }
    }

    /// Converts an anchor taken from another layout back into a scroll offset,
    /// clamped to `[0, total_height - viewport_height]`.
    pub fn resolve(&self, anchor: ScrollAnchor, viewport_height: u32) -> u32 {
        if self.slots.is_empty() {
            return 0;
        }
        let page = if anchor.page < self.slots.len() {
            anchor.page
        } else {
            warn!(
                "Anchor page {} outside layout of {} pages, clamping",
                anchor.page,
                self.slots.len()
            );
            self.slots.len() - 1
        };

        let slot = self.slots[page];
        let within = (anchor.ratio.max(0.0) * f64::from(slot.height)).floor() as u64;
        let scroll = u64::from(slot.offset) + within;
        scroll.min(u64::from(self.max_scroll(viewport_height))) as u32
    }
}

/// A layout-independent scroll position: page index plus fractional offset.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScrollAnchor {
    pub page: usize,
    pub ratio: f64,
}

/// Pixels scrolled per input step at a zoom level: `base * zoom^0.8`.
pub fn scroll_speed(zoom: Zoom, base: u32) -> u32 {
    (f64::from(base) * zoom.factor().powf(0.8)).floor() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_loader::{webtoon_height, webtoon_target_width};

    fn measured(heights: &[u32]) -> WebtoonLayout {
        WebtoonLayout::build(
            Zoom::ONE,
            400,
            heights.iter().map(|&h| (h, Provenance::Measured)),
        )
    }

    /// Layout of pages with known native sizes for a 1000 px wide viewport.
    fn layout_for(natives: &[(u32, u32)], zoom: Zoom) -> WebtoonLayout {
        let width = webtoon_target_width(1000, zoom);
        WebtoonLayout::build(
            zoom,
            width,
            natives
                .iter()
                .map(|&native| (webtoon_height(native, width), Provenance::Measured)),
        )
    }

    #[test]
    fn offsets_accumulate_with_gap() {
        let layout = measured(&[100, 200, 50]);
        let offsets: Vec<u32> = layout.slots().iter().map(|s| s.offset).collect();
        assert_eq!(offsets, vec![0, 105, 310]);
        assert_eq!(layout.total_height(), 365);
    }

    #[test]
    fn offsets_are_monotonic_for_mixed_provenance() {
        let heights = (0..40u32).map(|i| {
            if i % 3 == 0 {
                (250, Provenance::Estimated)
            } else {
                (i * 37 % 900, Provenance::Measured)
            }
        });
        let layout = WebtoonLayout::build(Zoom::from_factor(0.8), 320, heights);
        for pair in layout.slots().windows(2) {
            assert!(pair[1].offset >= pair[0].offset + pair[0].height);
        }
    }

    #[test]
    fn visible_range_includes_touching_pages() {
        let layout = measured(&[100, 100, 100, 100]);
        // Pages at 0, 105, 210, 315.
        assert_eq!(layout.visible_range(0, 50), 0..1);
        assert_eq!(layout.visible_range(100, 10), 0..2);
        assert_eq!(layout.visible_range(120, 100), 1..3);
        assert_eq!(layout.visible_range(400, 100), 3..4);
        assert_eq!(layout.visible_range(1000, 100), 4..4);
    }

    #[test]
    fn page_from_offset_uses_viewport_centre() {
        let layout = measured(&[100, 100, 100]);
        assert_eq!(layout.page_from_offset(0, 100), 1);
        assert_eq!(layout.page_from_offset(60, 100), 2);
        assert_eq!(layout.page_from_offset(5000, 100), 3);
        assert_eq!(WebtoonLayout::default().page_from_offset(0, 100), 0);
    }

    #[test]
    fn anchor_reports_page_and_fraction() {
        let layout = measured(&[100, 200, 100]);
        let anchor = layout.anchor_at(155);
        assert_eq!(anchor.page, 1);
        assert!((anchor.ratio - 0.25).abs() < 1e-9);
        assert_eq!(layout.resolve(anchor, 10), 155);
    }

    #[test]
    fn resolve_clamps_to_scrollable_range() {
        let layout = measured(&[100, 100]);
        let anchor = ScrollAnchor { page: 1, ratio: 0.9 };
        assert_eq!(layout.resolve(anchor, 150), layout.max_scroll(150));
        let beyond = ScrollAnchor { page: 7, ratio: 0.0 };
        assert_eq!(layout.resolve(beyond, 10), 105);
    }

    #[test]
    fn zoom_in_then_out_restores_scroll() {
        let natives: Vec<(u32, u32)> = (0..12u32).map(|i| (700 + i * 13, 2000 + i * 71)).collect();
        let base = layout_for(&natives, Zoom::ONE);
        let zoomed = layout_for(&natives, Zoom::from_factor(1.2));
        let viewport_height = 800;

        for scroll in (0..base.max_scroll(viewport_height)).step_by(37) {
            let up = zoomed.resolve(base.anchor_at(scroll), viewport_height);
            let back = base.resolve(zoomed.anchor_at(up), viewport_height);
            assert!(
                back.abs_diff(scroll) <= 1,
                "scroll {} came back as {}",
                scroll,
                back
            );
        }
    }

    #[test]
    fn zoom_keeps_the_top_page_under_the_viewport() {
        let natives = vec![(800, 2400); 6];
        let base = layout_for(&natives, Zoom::ONE);
        let zoomed = layout_for(&natives, Zoom::from_factor(1.4));

        let scroll = base.page_offset(3) + 300;
        let anchor = base.anchor_at(scroll);
        let moved = zoomed.resolve(anchor, 800);
        assert_eq!(zoomed.anchor_at(moved).page, 3);
    }

    #[test]
    fn scroll_speed_grows_sublinearly() {
        assert_eq!(scroll_speed(Zoom::ONE, 100), 100);
        let fast = scroll_speed(Zoom::from_factor(1.5), 100);
        assert!(fast > 100 && fast < 150);
    }
}
