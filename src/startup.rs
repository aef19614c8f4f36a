use crate::config::ReaderConfig;
use crate::error::{AppError, Result};
use crate::file_utils::PathExt;
use crate::image_cache::CacheStats;
use crate::image_loader::SurfaceBackend;
use crate::services::{MemoryProgressStore, ProgressKey, ProgressReporter};
use crate::state::ReaderSession;
use crate::view_mode::ViewMode;
use log::{info, warn};
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

/// Upper bound on frames rendered by one sweep.
const MAX_SWEEP_FRAMES: usize = 1_000_000;

/// Command line: `webtoon-reader <pages-dir> [config.json]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupArgs {
    pub pages_dir: PathBuf,
    pub config_path: Option<PathBuf>,
}

fn parse_args(args: impl IntoIterator<Item = OsString>) -> Option<StartupArgs> {
    let mut positional = args.into_iter().filter_map(|arg| {
        if arg.to_string_lossy().starts_with('-') {
            None
        } else {
            Some(PathBuf::from(arg))
        }
    });

    let pages_dir = positional.next()?;
    Some(StartupArgs {
        pages_dir,
        config_path: positional.next(),
    })
}

pub fn startup_args() -> Option<StartupArgs> {
    parse_args(std::env::args_os().skip(1))
}

/// Outcome of a headless read-through.
#[derive(Debug, Clone)]
pub struct SweepReport {
    pub mode: ViewMode,
    pub pages: usize,
    pub frames: usize,
    pub last_page: usize,
    pub cache: CacheStats,
}

/// Opens the pages directory and reads it from the first page to the last
/// with the full engine, one frame per step.
pub fn run_sweep<B: SurfaceBackend>(args: &StartupArgs) -> Result<SweepReport> {
    if !args.pages_dir.is_dir() {
        return Err(AppError::DirectoryScan(format!(
            "{} is not a directory",
            args.pages_dir.format_for_log()
        )));
    }

    let config = match &args.config_path {
        Some(path) => ReaderConfig::load(path)?,
        None => ReaderConfig::default(),
    };
    let progress_interval = config.progress_interval();
    let mut session = ReaderSession::<B>::open_dir(&args.pages_dir, config)?;
    let mode = session.mode();
    let pages = session.page_count();
    if pages == 0 {
        warn!("No pages in {}", args.pages_dir.format_for_log());
    }

    if let Some(key) = ProgressKey::from_archive_path(&args.pages_dir) {
        info!("Reading {} chapter {}", key.collection, key.chapter);
        session.attach_progress(ProgressReporter::new(
            key,
            Box::new(MemoryProgressStore::new()),
            progress_interval,
        ));
    }

    let mut frames = 0;
    while frames < MAX_SWEEP_FRAMES {
        let frame = session.render_frame();
        frames += 1;
        if frames % 100 == 0 {
            info!(
                "Frame {}: page {}/{} ({:.0}%)",
                frames,
                frame.current_page,
                frame.total_pages,
                frame.progress * 100.0
            );
        }
        if pages == 0 || session.at_end() {
            break;
        }
        session.page_down();
    }
    if frames >= MAX_SWEEP_FRAMES {
        warn!("Sweep stopped after {} frames", frames);
    }

    if !session.preloader().wait_idle(Duration::from_secs(5)) {
        warn!("Preload queue still busy at end of sweep");
    }
    let report = SweepReport {
        mode,
        pages,
        frames,
        last_page: session.current_page(),
        cache: session.cache_stats(),
    };
    session.close();

    info!(
        "Read {} pages in {} mode over {} frames; cache {}/{} resident, hit rate {:.1}%, {} evicted",
        report.pages,
        report.mode,
        report.frames,
        report.cache.resident,
        report.cache.capacity,
        report.cache.hit_rate() * 100.0,
        report.cache.evictions
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_loader::RgbBackend;
    use image::RgbImage;

    fn os(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[test]
    fn flags_are_skipped() {
        let args = parse_args(os(&["-v", "pages", "--x", "reader.json"])).unwrap();
        assert_eq!(args.pages_dir, PathBuf::from("pages"));
        assert_eq!(args.config_path, Some(PathBuf::from("reader.json")));
        assert!(parse_args(os(&["--help"])).is_none());
    }

    #[test]
    fn sweep_reads_to_the_last_page() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("Tower").join("Chapter_3");
        std::fs::create_dir_all(&dir).unwrap();
        for i in 1..=12 {
            RgbImage::new(10, 40).save(dir.join(format!("{}.png", i))).unwrap();
        }

        let report = run_sweep::<RgbBackend>(&StartupArgs {
            pages_dir: dir,
            config_path: None,
        })
        .unwrap();
        assert_eq!(report.mode, ViewMode::Webtoon);
        assert_eq!(report.pages, 12);
        assert_eq!(report.last_page, 12);
        assert!(report.cache.resident <= report.cache.capacity);
    }

    #[test]
    fn manga_sweep_turns_every_page() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("Berserk").join("ch12");
        std::fs::create_dir_all(&dir).unwrap();
        for i in 1..=4 {
            RgbImage::new(30, 40).save(dir.join(format!("{}.png", i))).unwrap();
        }

        let report = run_sweep::<RgbBackend>(&StartupArgs {
            pages_dir: dir,
            config_path: None,
        })
        .unwrap();
        assert_eq!(report.mode, ViewMode::Manga);
        assert_eq!(report.last_page, 4);
        // 20 frames per turn at the default speed.
        assert!(report.frames > 3 * 19);
    }

    #[test]
    fn missing_directory_is_an_error() {
        let err = run_sweep::<RgbBackend>(&StartupArgs {
            pages_dir: PathBuf::from("/nonexistent/pages"),
            config_path: None,
        })
        .unwrap_err();
        assert!(matches!(err, AppError::DirectoryScan(_)));
    }
}
