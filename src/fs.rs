//! File-system access used around database files.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::MapperError;

/// Sidecar files SQLite may leave next to a database.
const SIDECAR_SUFFIXES: &[&str] = &["-wal", "-shm", "-journal"];

pub trait FileSystem: Send + Sync {
    fn exists(&self, path: &Path) -> bool;

    /// Open the file, creating it when missing; existing contents are kept.
    ///
    /// # Errors
    /// Returns the underlying I/O error.
    fn open_or_create(&self, path: &Path) -> io::Result<File>;

    /// # Errors
    /// Returns the underlying I/O error.
    fn delete(&self, path: &Path) -> io::Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StdFileSystem;

impl FileSystem for StdFileSystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn open_or_create(&self, path: &Path) -> io::Result<File> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
    }

    fn delete(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Make sure the database file exists, e.g. before opening it without the create flag.
///
/// # Errors
/// Returns [`MapperError::Io`] when the file cannot be created.
pub fn ensure_database(fs: &dyn FileSystem, path: impl AsRef<Path>) -> Result<(), MapperError> {
    let path = path.as_ref();
    if !fs.exists(path) {
        fs.open_or_create(path)?;
        info!(path = %path.display(), "database file created");
    }
    Ok(())
}

/// Remove a database file together with its journal and WAL sidecars.
///
/// Returns whether the main file existed. Missing sidecars are skipped.
///
/// # Errors
/// Returns [`MapperError::Io`] when an existing file cannot be removed.
pub fn delete_database(fs: &dyn FileSystem, path: impl AsRef<Path>) -> Result<bool, MapperError> {
    let path = path.as_ref();
    let existed = fs.exists(path);
    if existed {
        fs.delete(path)?;
    }
    for suffix in SIDECAR_SUFFIXES {
        let sidecar = with_suffix(path, suffix);
        if fs.exists(&sidecar) {
            debug!(path = %sidecar.display(), "removing sidecar");
            fs.delete(&sidecar)?;
        }
    }
    if existed {
        info!(path = %path.display(), "database deleted");
    }
    Ok(existed)
}
