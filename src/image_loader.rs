//! Decodes a page from storage and resizes it for a viewing mode.
//!
//! Loading is a pure function of its arguments: no shared state, safe to call
//! from the render thread and the preload worker at the same time.

use crate::config::{MANGA_FIT_MARGIN, WEBTOON_WIDTH_PERCENT};
use crate::error::{AppError, Result};
use crate::file_utils::PathExt;
use crate::state::Viewport;
use crate::view_mode::{ViewMode, Zoom};
use image::RgbImage;
use image::imageops::FilterType;
use std::path::Path;
use std::sync::Arc;

/// Produces blit-able handles from decoded, resized pixels.
///
/// The cache and the renderers only ever clone and hand out `Surface`s; what a
/// surface is depends on the drawing backend.
pub trait SurfaceBackend: Send + Sync + 'static {
    type Surface: Clone + Send + Sync + 'static;

    fn create_surface(pixels: RgbImage) -> Self::Surface;
}

/// Backend that keeps the resized RGB8 buffer itself as the surface.
pub struct RgbBackend;

impl SurfaceBackend for RgbBackend {
    type Surface = Arc<RgbImage>;

    fn create_surface(pixels: RgbImage) -> Self::Surface {
        Arc::new(pixels)
    }
}

/// A decoded page ready for display.
#[derive(Clone)]
pub struct LoadedImage<S> {
    pub surface: S,
    pub width: u32,
    pub height: u32,
}

/// Width of a webtoon page: 40% of the viewport, scaled by zoom, never zero.
pub fn webtoon_target_width(viewport_width: u32, zoom: Zoom) -> u32 {
    let width = u64::from(viewport_width) * WEBTOON_WIDTH_PERCENT * u64::from(zoom.hundredths())
        / 10_000;
    width.clamp(1, u64::from(u32::MAX)) as u32
}

/// Height of a webtoon page of native size `native` drawn `target_width` wide.
pub fn webtoon_height(native: (u32, u32), target_width: u32) -> u32 {
    let (native_w, native_h) = native;
    if native_w == 0 {
        return native_h;
    }
    let height = u64::from(native_h) * u64::from(target_width) / u64::from(native_w);
    height.min(u64::from(u32::MAX)) as u32
}

/// Display size of a page of native size `native`.
///
/// Webtoon pages take a width from the viewport and keep their aspect ratio.
/// Manga pages fit inside the viewport with a 10% margin, then zoom applies.
pub fn target_size(native: (u32, u32), viewport: Viewport, zoom: Zoom, mode: ViewMode) -> (u32, u32) {
    match mode {
        ViewMode::Webtoon => {
            let width = webtoon_target_width(viewport.width, zoom);
            (width, webtoon_height(native, width))
        }
        ViewMode::Manga => {
            let (native_w, native_h) = (f64::from(native.0.max(1)), f64::from(native.1.max(1)));
            let fit = (f64::from(viewport.width) / native_w).min(f64::from(viewport.height) / native_h);
            let scale = fit * MANGA_FIT_MARGIN * zoom.factor();
            (
                (native_w * scale).floor() as u32,
                (native_h * scale).floor() as u32,
            )
        }
    }
}

/// Decodes `path`, normalises it to RGB8 and resizes it with Lanczos3.
///
/// Fails on unreadable files, decode errors and zero-width sources; callers
/// show a placeholder instead of the page.
pub fn load_image<B: SurfaceBackend>(
    path: &Path,
    viewport: Viewport,
    zoom: Zoom,
    mode: ViewMode,
) -> Result<LoadedImage<B::Surface>> {
    let img = image::ImageReader::open(path)
        .map_err(|e| AppError::ImageLoad(format!("{}: {}", path.format_for_log(), e)))?
        .with_guessed_format()
        .map_err(|e| AppError::ImageLoad(format!("{}: {}", path.format_for_log(), e)))?
        .decode()?;

    if img.width() == 0 || img.height() == 0 {
        return Err(AppError::ImageLoad(format!(
            "{}: empty source image",
            path.format_for_log()
        )));
    }

    let rgb = img.to_rgb8();
    let (width, height) = target_size(rgb.dimensions(), viewport, zoom, mode);
    let (width, height) = (width.max(1), height.max(1));
    let resized = image::imageops::resize(&rgb, width, height, FilterType::Lanczos3);

    Ok(LoadedImage {
        surface: B::create_surface(resized),
        width,
        height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    const VIEWPORT: Viewport = Viewport {
        width: 1000,
        height: 800,
    };

    #[test]
    fn webtoon_size_follows_viewport_width() {
        assert_eq!(
            target_size((20, 60), VIEWPORT, Zoom::ONE, ViewMode::Webtoon),
            (400, 1200)
        );
        assert_eq!(
            target_size((20, 60), VIEWPORT, Zoom::from_factor(1.2), ViewMode::Webtoon),
            (480, 1440)
        );
        assert_eq!(
            target_size((300, 100), VIEWPORT, Zoom::from_factor(0.6), ViewMode::Webtoon),
            (240, 80)
        );
    }

    #[test]
    fn manga_size_fits_viewport_with_margin() {
        // Height-bound: 800 / 1600 = 0.5, * 0.9 = 0.45
        assert_eq!(
            target_size((1000, 1600), VIEWPORT, Zoom::ONE, ViewMode::Manga),
            (450, 720)
        );
        // Width-bound: 1000 / 2000 = 0.5, * 0.9 = 0.45
        assert_eq!(
            target_size((2000, 500), VIEWPORT, Zoom::ONE, ViewMode::Manga),
            (900, 225)
        );
    }

    #[test]
    fn loads_and_resizes_to_three_channels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.png");
        RgbaImage::from_pixel(20, 60, Rgba([200, 10, 10, 128]))
            .save(&path)
            .unwrap();

        let loaded = load_image::<RgbBackend>(&path, VIEWPORT, Zoom::ONE, ViewMode::Webtoon).unwrap();
        assert_eq!((loaded.width, loaded.height), (400, 1200));
        assert_eq!(loaded.surface.dimensions(), (400, 1200));
    }

    #[test]
    fn unreadable_source_is_an_image_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.png");
        let corrupt = dir.path().join("corrupt.png");
        std::fs::write(&corrupt, b"garbage").unwrap();

        for path in [missing, corrupt] {
            let result = load_image::<RgbBackend>(&path, VIEWPORT, Zoom::ONE, ViewMode::Manga);
            assert!(matches!(result, Err(AppError::ImageLoad(_))));
        }
    }
}
