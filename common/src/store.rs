//! Durable log store – whole-document persistence.
//!
//! The store only knows how to read, write, test for and delete a single
//! blob.  Session semantics live in [`crate::session`].

use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

/// Whole-document key-value persistence.
pub trait LogStore: Send + Sync {
    fn read(&self) -> io::Result<String>;
    fn write(&self, contents: &str) -> io::Result<()>;
    fn exists(&self) -> bool;
    fn delete(&self) -> io::Result<()>;
    /// Human-readable name of the document (a file path for [`FileStore`]).
    fn identifier(&self) -> String;
}

/// A single JSON file inside a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    directory: PathBuf,
    filename: String,
}

impl FileStore {
    /// Create the store, creating `directory` if it does not exist.
    pub fn new(directory: impl AsRef<Path>, filename: impl Into<String>) -> io::Result<Self> {
        let directory = directory.as_ref();
        if !directory.is_dir() {
            std::fs::create_dir_all(directory)?;
            info!("Created directory: {}", directory.display());
        }
        let directory = directory.canonicalize()?;
        Ok(FileStore {
            directory,
            filename: filename.into(),
        })
    }

    /// Wrap a file path as given, e.g. a capture file handed to the replay
    /// tool.  Nothing is created on disk.
    pub fn from_path(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let filename = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("not a file path: {}", path.display()),
                )
            })?;
        let directory = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Ok(FileStore {
            directory,
            filename,
        })
    }

    pub fn path(&self) -> PathBuf {
        self.directory.join(&self.filename)
    }

    fn temp_path(&self) -> PathBuf {
        self.directory.join(format!(".{}.tmp", self.filename))
    }

    /// Remove a directory and everything below it.  Missing directories are
    /// ignored.
    pub fn delete_dir(dir: impl AsRef<Path>) -> io::Result<()> {
        let dir = dir.as_ref();
        if dir.exists() {
            std::fs::remove_dir_all(dir)?;
            info!("Removed directory: {}", dir.display());
        }
        Ok(())
    }
}

/// Most recently modified `*.json` document in `dir`, if any.  Hidden
/// files (including in-flight temp files) are skipped.
pub fn latest_document(dir: impl AsRef<Path>) -> io::Result<Option<PathBuf>> {
    let mut latest: Option<(std::time::SystemTime, PathBuf)> = None;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if hidden || path.extension() != Some(OsStr::new("json")) {
            continue;
        }
        let meta = entry.metadata()?;
        if !meta.is_file() {
            continue;
        }
        let modified = meta.modified()?;
        match &latest {
            Some((newest, _)) if modified <= *newest => {}
            _ => latest = Some((modified, path)),
        }
    }
    Ok(latest.map(|(_, path)| path))
}

impl LogStore for FileStore {
    fn read(&self) -> io::Result<String> {
        let path = self.path();
        let text = std::fs::read_to_string(&path)?;
        debug!("Read JSON data from: {}", path.display());
        Ok(text)
    }

    /// Write via a sibling temp file and rename, so a reader never sees a
    /// half-written document.
    fn write(&self, contents: &str) -> io::Result<()> {
        let path = self.path();
        let tmp = self.temp_path();
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, &path)?;
        debug!("Wrote JSON data to: {}", path.display());
        Ok(())
    }

    fn exists(&self) -> bool {
        let exists = self.path().exists();
        debug!("Checked if {} exists: {exists}", self.path().display());
        exists
    }

    fn delete(&self) -> io::Result<()> {
        let path = self.path();
        match std::fs::remove_file(&path) {
            Ok(()) => {
                info!("Deleted file: {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("Attempted to delete non-existent file: {}", path.display());
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn identifier(&self) -> String {
        self.path().display().to_string()
    }
}

impl std::fmt::Display for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path().display())
    }
}
