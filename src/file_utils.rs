use crate::config::SUPPORTED_IMAGE_EXTENSIONS;
use crate::error::{AppError, Result};
use log::{debug, warn};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};

/// Path helpers for log output.
pub trait PathExt {
    /// Short, lossy rendering of a path for log lines.
    fn format_for_log(&self) -> String;
}

impl PathExt for Path {
    fn format_for_log(&self) -> String {
        self.display().to_string()
    }
}

impl PathExt for PathBuf {
    fn format_for_log(&self) -> String {
        self.as_path().format_for_log()
    }
}

pub fn is_supported_image(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext_str| SUPPORTED_IMAGE_EXTENSIONS.contains(&ext_str.to_lowercase().as_str()))
            .unwrap_or(false)
}

/// Orders page files so that `2.png` comes before `10.png`.
fn page_sort_key(path: &Path) -> (usize, String) {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    (stem.chars().count(), stem)
}

/// Lists the page images of an extracted chapter in reading order.
pub fn scan_pages(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut pages: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| is_supported_image(path))
        .collect();

    pages.sort_by_cached_key(|path| page_sort_key(path));
    debug!("Found {} pages in {}", pages.len(), dir.format_for_log());
    Ok(pages)
}

/// Reads a page's native dimensions from its header, without decoding pixels.
pub fn read_native_size(path: &Path) -> Result<(u32, u32)> {
    let size = image::ImageReader::open(path)
        .map_err(|e| AppError::ImageLoad(format!("{}: {}", path.format_for_log(), e)))?
        .with_guessed_format()
        .map_err(|e| AppError::ImageLoad(format!("{}: {}", path.format_for_log(), e)))?
        .into_dimensions()?;
    Ok(size)
}

/// Reads native dimensions for every page in parallel.
///
/// Unreadable headers become `None`; the layout falls back to decoding or
/// placeholders for those pages.
pub fn scan_page_sizes(pages: &[PathBuf]) -> Vec<Option<(u32, u32)>> {
    let start = std::time::Instant::now();
    let sizes: Vec<Option<(u32, u32)>> = pages
        .par_iter()
        .map(|path| match read_native_size(path) {
            Ok(size) => Some(size),
            Err(e) => {
                warn!("Cannot read size of {}: {}", path.format_for_log(), e);
                None
            }
        })
        .collect();

    debug!(
        "Scanned {} page headers in {:?}",
        pages.len(),
        start.elapsed()
    );
    sizes
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[test]
    fn pages_sort_by_stem_length_then_name() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["10.png", "2.png", "1.png", "notes.txt", "b.JPG"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }

        let names: Vec<String> = scan_pages(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["1.png", "2.png", "b.JPG", "10.png"]);
    }

    #[test]
    fn missing_directory_is_a_scan_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = scan_pages(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, AppError::DirectoryScan(_)));
    }

    #[test]
    fn sizes_come_from_headers() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("1.png");
        RgbImage::new(30, 90).save(&good).unwrap();
        let broken = dir.path().join("2.png");
        fs::write(&broken, b"not a png").unwrap();

        let sizes = scan_page_sizes(&[good, broken]);
        assert_eq!(sizes, vec![Some((30, 90)), None]);
    }
}
