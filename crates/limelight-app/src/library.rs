//! Media library resolution.
//!
//! The media root holds alphabetically-ordered subfolders; each subfolder
//! holds alphabetically-ordered media files and/or `.txt` stream references
//! whose first line is a URL. The folder channel selects a folder (0-based),
//! the file channel selects an entry within it (1-based; 0 is intercepted
//! upstream as "stop" and never reaches this module).
//!
//! Directory contents are re-enumerated on every resolution so changes made
//! through the file-management API are picked up without a restart. Every
//! error here is non-destructive: the caller keeps playing whatever was
//! already running.

use std::fmt;
use std::path::{Path, PathBuf};

/// A resolved playback source: a local file or a remote stream URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    File(PathBuf),
    Stream(String),
}

impl MediaSource {
    /// The string handed to the player (path or URL).
    pub fn location(&self) -> String {
        match self {
            Self::File(path) => path.display().to_string(),
            Self::Stream(url) => url.clone(),
        }
    }
}

impl fmt::Display for MediaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Stream(url) => write!(f, "{url}"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LibraryError {
    #[error("folder index {index} out of range ({count} folders in {root})")]
    NoSuchFolder {
        index: u8,
        count: usize,
        root: PathBuf,
    },

    #[error("file index {index} out of range ({count} entries in '{folder}')")]
    NoSuchFile {
        index: u8,
        count: usize,
        folder: String,
    },

    #[error("unusable stream reference {path}: {reason}")]
    UnsupportedFormat { path: PathBuf, reason: String },
}

/// Resolves folder/file channel indices against a media directory tree.
#[derive(Debug, Clone)]
pub struct MediaLibrary {
    root: PathBuf,
}

impl MediaLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a (folder, file) index pair to a playback source.
    ///
    /// `file_index` is 1-based; 0 must be handled as "stop" before calling.
    pub fn resolve(&self, folder_index: u8, file_index: u8) -> Result<MediaSource, LibraryError> {
        debug_assert!(file_index > 0, "file index 0 is stop, not a selection");

        let folders = sorted_entries(&self.root, |p| p.is_dir());
        let folder = folders
            .get(usize::from(folder_index))
            .ok_or_else(|| LibraryError::NoSuchFolder {
                index: folder_index,
                count: folders.len(),
                root: self.root.clone(),
            })?;

        let files = sorted_entries(folder, |p| p.is_file());
        let idx = usize::from(file_index) - 1;
        let path = files.get(idx).ok_or_else(|| LibraryError::NoSuchFile {
            index: file_index,
            count: files.len(),
            folder: folder
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        })?;

        if is_stream_reference(path) {
            read_stream_reference(path)
        } else {
            Ok(MediaSource::File(path.clone()))
        }
    }
}

/// List directory entries matching `keep`, sorted alphabetically by name.
/// A missing or unreadable directory yields an empty list, which surfaces
/// upstream as an out-of-range index.
fn sorted_entries(dir: &Path, keep: impl Fn(&Path) -> bool) -> Vec<PathBuf> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .into_iter()
        .flatten()
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| keep(p))
        .collect();
    entries.sort_by_key(|p| p.file_name().map(std::ffi::OsStr::to_os_string));
    entries
}

fn is_stream_reference(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("txt"))
}

/// Read a stream-reference file: first line is the URL.
fn read_stream_reference(path: &Path) -> Result<MediaSource, LibraryError> {
    let contents = std::fs::read_to_string(path).map_err(|e| LibraryError::UnsupportedFormat {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let url = contents.lines().next().unwrap_or("").trim();
    if url.is_empty() {
        return Err(LibraryError::UnsupportedFormat {
            path: path.to_path_buf(),
            reason: "stream reference is empty".into(),
        });
    }
    log::info!("Resolved stream URL from {}: {url}", path.display());
    Ok(MediaSource::Stream(url.to_string()))
}
