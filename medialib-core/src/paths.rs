//! On-disk layout of a database directory.
//!
//! ```text
//! <base>/medialib/
//!     config.toml   per-context settings
//!     lock          held while the database is open
//!     cache/        backend object caches
//!     thumbnails/   derived images, purged on rescan
//! ```

use std::path::{Path, PathBuf};

pub const DB_DIR_NAME: &str = "medialib";
pub const CONFIG_FILE: &str = "config.toml";
pub const CACHE_DIR: &str = "cache";
pub const THUMBNAILS_DIR: &str = "thumbnails";

/// Base directory used when none is configured.
pub fn default_base_dir() -> PathBuf {
    dirs::data_dir().unwrap_or_else(|| PathBuf::from("."))
}

pub fn db_dir(base: &Path) -> PathBuf {
    base.join(DB_DIR_NAME)
}

pub fn config_file(db_dir: &Path) -> PathBuf {
    db_dir.join(CONFIG_FILE)
}

pub fn cache_dir(db_dir: &Path) -> PathBuf {
    db_dir.join(CACHE_DIR)
}

pub fn thumbnails_dir(db_dir: &Path) -> PathBuf {
    db_dir.join(THUMBNAILS_DIR)
}
