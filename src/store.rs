//! Filesystem primitives over the served tree.

use std::cmp::Ordering;
use std::convert::Infallible;
use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use chrono::{DateTime, Utc};
use http_body_util::LengthLimitError;
use serde::Serialize;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::error::FileServerError;
use crate::path::resolve_and_verify_path;

/// Name prefix of in-progress uploads next to their target.
const STAGING_PREFIX: &str = ".treeserve-upload-";

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryMetadata {
    pub name: String,
    pub size: u64,
    pub mod_time: DateTime<Utc>,
    pub is_dir: bool,
}

impl EntryMetadata {
    fn from_metadata(name: String, metadata: &Metadata) -> Self {
        Self {
            name,
            size: metadata.len(),
            mod_time: metadata.modified().unwrap_or(UNIX_EPOCH).into(),
            is_dir: metadata.is_dir(),
        }
    }
}

/// Sort a listing directories first, then by name.
pub fn sort_entries(entries: &mut [EntryMetadata]) {
    entries.sort_by(|a, b| match (a.is_dir, b.is_dir) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a.name.cmp(&b.name),
    });
}

/// A resolved, existing target.
#[derive(Debug)]
pub struct Stat {
    pub path: PathBuf,
    pub metadata: Metadata,
}

impl Stat {
    pub fn is_dir(&self) -> bool {
        self.metadata.is_dir()
    }
}

/// Read/list/write access to the tree below `root`.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `target` and read its metadata.
    ///
    /// Anything that prevents reading the target other than a traversal
    /// attempt is reported as [`FileServerError::NotFound`].
    pub async fn stat(&self, target: &str) -> Result<Stat, FileServerError> {
        let path = match resolve_and_verify_path(&self.root, target) {
            Ok(path) => path,
            Err(FileServerError::PathTraversal) => return Err(FileServerError::PathTraversal),
            Err(err) => {
                debug!("Stat of {target:?} failed: {err}");
                return Err(FileServerError::NotFound(target.to_string()));
            }
        };

        let metadata = fs::metadata(&path)
            .await
            .map_err(|_| FileServerError::NotFound(target.to_string()))?;

        Ok(Stat { path, metadata })
    }

    /// List the immediate children of the directory at `target`.
    ///
    /// Entries whose metadata cannot be read are skipped. The order is
    /// whatever the filesystem yields.
    pub async fn list(&self, target: &str) -> Result<Vec<EntryMetadata>, FileServerError> {
        let path = resolve_and_verify_path(&self.root, target)?;
        let mut entries = fs::read_dir(&path).await?;
        let mut children = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            children.push((name, entry.metadata().await));
        }

        Ok(collect_entries(children))
    }

    /// Create or replace the file at `target` with everything read from
    /// `content`. Returns the number of bytes written.
    ///
    /// An existing directory is always a conflict. An existing non-empty file
    /// is a conflict unless `overwrite` is set. Empty files count as absent.
    /// The content is staged in a temporary file and renamed over the target
    /// only once fully written, so a failed upload leaves the old file intact.
    pub async fn put<R>(
        &self,
        target: &str,
        content: &mut R,
        overwrite: bool,
    ) -> Result<u64, FileServerError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let path = resolve_and_verify_path(&self.root, target)?;

        if let Ok(existing) = fs::metadata(&path).await {
            if existing.is_dir() {
                return Err(FileServerError::Conflict(format!(
                    "{target:?} is an existing directory"
                )));
            }
            if existing.len() > 0 && !overwrite {
                return Err(FileServerError::Conflict(format!("{target:?} already exists")));
            }
        }

        let parent = path
            .parent()
            .ok_or_else(|| FileServerError::InvalidPath(target.to_string()))?;
        fs::create_dir_all(parent).await.map_err(|err| {
            warn!("Failed to create directory {}: {err}", parent.display());
            FileServerError::CreateDirFailed(parent.display().to_string())
        })?;

        // Staged in the target's directory so the rename never crosses
        // filesystems. Dropping `staged` removes the partial upload.
        let (file, staged) = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempfile_in(parent)?
            .into_parts();
        let mut dst = fs::File::from_std(file);

        let written = match tokio::io::copy(content, &mut dst).await {
            Ok(written) => written,
            Err(err) => {
                warn!("Upload to {} aborted: {err}", path.display());
                return Err(upload_error(target, err));
            }
        };
        dst.flush().await?;
        drop(dst);

        staged
            .persist(&path)
            .map_err(|err| FileServerError::Io(err.error))?;

        info!("Wrote {} ({written} bytes)", path.display());
        Ok(written)
    }

    /// Deletion is not supported.
    pub async fn delete(&self, _target: &str) -> Result<Infallible, FileServerError> {
        Err(FileServerError::NotImplemented("delete"))
    }
}

/// Turn raw `(name, metadata)` pairs into listing entries, skipping the ones
/// whose metadata could not be read.
fn collect_entries(
    children: impl IntoIterator<Item = (String, io::Result<Metadata>)>,
) -> Vec<EntryMetadata> {
    children
        .into_iter()
        .filter_map(|(name, metadata)| match metadata {
            Ok(metadata) => Some(EntryMetadata::from_metadata(name, &metadata)),
            Err(err) => {
                warn!("Read {name:?} info error {err}");
                None
            }
        })
        .collect()
}

/// Map a failed upload copy, recognising the request body limit anywhere in
/// the error's source chain.
fn upload_error(target: &str, err: io::Error) -> FileServerError {
    let mut source = err
        .get_ref()
        .map(|inner| inner as &(dyn std::error::Error + 'static));
    while let Some(cause) = source {
        if cause.is::<LengthLimitError>() {
            return FileServerError::FileTooLarge(target.to_string());
        }
        source = cause.source();
    }
    FileServerError::Io(err)
}
