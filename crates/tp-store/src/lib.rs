//! Storage layer for activity posts.
//!
//! Entries live in a Hugo content tree as `{posts_dir}/{YYYY}/{key}/index.md`,
//! each a TOML front-matter document (see [`frontmatter`]). This crate is the
//! only writer of that tree.
//!
//! # Saving
//!
//! [`save`] writes to a temporary file in the entry's directory and renames it
//! over `index.md`, so an interrupted save never leaves a truncated document.

pub mod devices;
pub mod frontmatter;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

use tp_core::{ENTRY_FILE_NAME, Entry, EntryWriter, ResolvedInstant};

pub use devices::{DEVICE_FILE_NAME, DeviceFailure, DeviceLoad, load_devices};
pub use frontmatter::{Document, FrontMatterError};

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid document {path}: {source}")]
    Document {
        path: PathBuf,
        #[source]
        source: FrontMatterError,
    },
    #[error("entry directory already exists: {0}")]
    AlreadyExists(PathBuf),
}

impl StoreError {
    fn io<'a>(action: &'static str, path: &'a Path) -> impl FnOnce(std::io::Error) -> Self + 'a {
        move |source| Self::Io {
            action,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Reads a front-matter document from disk.
pub fn read_document(path: &Path) -> Result<Document, StoreError> {
    let text = fs::read_to_string(path).map_err(StoreError::io("failed to read", path))?;
    frontmatter::parse(&text).map_err(|source| StoreError::Document {
        path: path.to_path_buf(),
        source,
    })
}

/// Copies the template into a new entry directory.
///
/// Fails with [`StoreError::AlreadyExists`] if `target_dir` exists; callers
/// overwriting an entry remove the directory first.
pub fn create(template: &Path, target_dir: &Path) -> Result<PathBuf, StoreError> {
    if target_dir.exists() {
        return Err(StoreError::AlreadyExists(target_dir.to_path_buf()));
    }
    if let Some(parent) = target_dir.parent() {
        fs::create_dir_all(parent).map_err(StoreError::io("failed to create", parent))?;
    }
    fs::create_dir(target_dir).map_err(|source| {
        if source.kind() == std::io::ErrorKind::AlreadyExists {
            StoreError::AlreadyExists(target_dir.to_path_buf())
        } else {
            StoreError::io("failed to create", target_dir)(source)
        }
    })?;

    let path = target_dir.join(ENTRY_FILE_NAME);
    if let Err(source) = fs::copy(template, &path) {
        // Leave no half-created entry behind.
        let _ = fs::remove_dir_all(target_dir);
        return Err(StoreError::io("failed to copy template", template)(source));
    }
    tracing::debug!(path = %path.display(), "created entry from template");
    Ok(path)
}

/// Loads the entry whose `index.md` is at `path`.
pub fn load(path: &Path) -> Result<Entry, StoreError> {
    let document = read_document(path)?;
    Ok(Entry::new(path, document.fields, document.body))
}

/// Writes an entry back to its `index.md`, replacing it atomically.
pub fn save(entry: &Entry) -> Result<(), StoreError> {
    let text = frontmatter::render(&Document {
        fields: entry.fields.clone(),
        body: entry.body.clone(),
    })
    .map_err(|source| StoreError::Document {
        path: entry.path.clone(),
        source,
    })?;

    let dir = entry
        .path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .map_err(StoreError::io("failed to create temp file in", dir))?;
    tmp.write_all(text.as_bytes())
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(StoreError::io("failed to write", tmp.path()))?;
    tmp.persist(&entry.path)
        .map_err(|e| StoreError::io("failed to replace", &entry.path)(e.error))?;

    tracing::debug!(path = %entry.path.display(), "saved entry");
    Ok(())
}

/// Entry storage rooted at a posts directory.
#[derive(Debug, Clone)]
pub struct EntryStore {
    posts_dir: PathBuf,
    template: PathBuf,
}

impl EntryStore {
    pub fn new(posts_dir: impl Into<PathBuf>, template: impl Into<PathBuf>) -> Self {
        Self {
            posts_dir: posts_dir.into(),
            template: template.into(),
        }
    }

    /// Directory of the entry for a resolved start instant.
    pub fn entry_dir(&self, instant: &ResolvedInstant) -> PathBuf {
        self.posts_dir
            .join(instant.local.format("%Y").to_string())
            .join(instant.key.as_str())
    }

    /// Creates an entry directory from the template and loads it.
    ///
    /// If the copied template cannot be loaded, the directory is removed again.
    pub fn create(&self, target_dir: &Path) -> Result<Entry, StoreError> {
        let path = create(&self.template, target_dir)?;
        load(&path).inspect_err(|_| {
            let _ = fs::remove_dir_all(target_dir);
        })
    }
}

impl EntryWriter for EntryStore {
    fn save(&self, entry: &Entry) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        save(entry).map_err(Into::into)
    }
}
