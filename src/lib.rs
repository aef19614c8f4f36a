//! Reading engine for image sequences: continuous webtoon scrolling and
//! paged manga reading over a shared, bounded cache of decoded pages.

pub mod config;
pub mod error;
pub mod file_utils;
pub mod image_cache;
pub mod image_loader;
pub mod layout;
pub mod preload;
pub mod render;
pub mod services;
pub mod startup;
pub mod state;
pub mod view_mode;

pub use error::{AppError, Result};
pub use state::ReaderSession;
