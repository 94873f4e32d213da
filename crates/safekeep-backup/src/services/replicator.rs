use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ReplicationError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Replication task failed: {0}")]
    Task(String),
}

/// Copies and measures the uploads and assets trees.
#[derive(Debug, Clone, Default)]
pub struct FileTreeReplicator;

impl FileTreeReplicator {
    pub fn new() -> Self {
        Self
    }

    /// Total size in bytes of every file under `path`. A missing path is 0.
    pub async fn size_of(&self, path: &Path) -> u64 {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || walk_files(&path).map(|(_, len)| len).sum())
            .await
            .unwrap_or(0)
    }

    /// Number of regular files under `path`. A missing path is 0.
    pub async fn file_count(&self, path: &Path) -> usize {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || walk_files(&path).count())
            .await
            .unwrap_or(0)
    }

    /// Replace `destination` with a copy of `source` and return the number
    /// of files copied. A missing `source` is a no-op returning 0 and leaves
    /// `destination` untouched.
    pub async fn copy_tree(
        &self,
        source: &Path,
        destination: &Path,
    ) -> Result<usize, ReplicationError> {
        let source = source.to_path_buf();
        let destination = destination.to_path_buf();
        tokio::task::spawn_blocking(move || copy_tree_blocking(&source, &destination))
            .await
            .map_err(|e| ReplicationError::Task(e.to_string()))?
    }
}

fn walk_files(path: &Path) -> impl Iterator<Item = (PathBuf, u64)> {
    WalkDir::new(path)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                // The root not existing is the normal "tree absent" case
                if e.depth() > 0 {
                    warn!("Skipping unreadable entry while walking tree: {}", e);
                }
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let len = entry.metadata().ok()?.len();
            Some((entry.into_path(), len))
        })
}

fn copy_tree_blocking(source: &Path, destination: &Path) -> Result<usize, ReplicationError> {
    if !source.exists() {
        debug!(source = %source.display(), "Source tree absent, nothing to copy");
        return Ok(0);
    }
    // Probe readability before destroying the destination
    fs::read_dir(source).map_err(|source_err| ReplicationError::Read {
        path: source.to_path_buf(),
        source: source_err,
    })?;

    let write_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| ReplicationError::Write { path, source }
    };

    if destination.exists() {
        fs::remove_dir_all(destination).map_err(write_err(destination))?;
    }
    fs::create_dir_all(destination).map_err(write_err(destination))?;

    let mut copied = 0usize;
    for entry in WalkDir::new(source).min_depth(1) {
        let entry = entry.map_err(|e| ReplicationError::Read {
            path: e.path().map(Path::to_path_buf).unwrap_or_else(|| source.to_path_buf()),
            source: e
                .into_io_error()
                .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "filesystem loop")),
        })?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| ReplicationError::Read {
                path: entry.path().to_path_buf(),
                source: io::Error::new(io::ErrorKind::InvalidInput, e.to_string()),
            })?;
        let target = destination.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(write_err(&target))?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(write_err(parent))?;
            }
            fs::copy(entry.path(), &target).map_err(write_err(&target))?;
            copied += 1;
        }
    }

    debug!(
        source = %source.display(),
        destination = %destination.display(),
        copied,
        "Tree replicated"
    );
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(path: &Path, contents: &[u8]) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[tokio::test]
    async fn test_size_and_count() {
        let dir = TempDir::new().unwrap();
        let tree = dir.path().join("uploads");
        write(&tree.join("a.txt"), b"12345");
        write(&tree.join("sub/b.txt"), b"123");

        let replicator = FileTreeReplicator::new();
        assert_eq!(replicator.size_of(&tree).await, 8);
        assert_eq!(replicator.file_count(&tree).await, 2);
        assert_eq!(replicator.size_of(&tree.join("a.txt")).await, 5);
    }

    #[tokio::test]
    async fn test_missing_path_is_zero() {
        let dir = TempDir::new().unwrap();
        let replicator = FileTreeReplicator::new();
        assert_eq!(replicator.size_of(&dir.path().join("absent")).await, 0);
        assert_eq!(replicator.file_count(&dir.path().join("absent")).await, 0);
    }

    #[tokio::test]
    async fn test_copy_replaces_destination() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("staging/uploads");
        write(&source.join("keep.txt"), b"fresh");
        write(&source.join("x/y/z.txt"), b"deep");
        let destination = dir.path().join("live/uploads");
        write(&destination.join("stale.txt"), b"old");

        let copied = FileTreeReplicator::new()
            .copy_tree(&source, &destination)
            .await
            .unwrap();

        assert_eq!(copied, 2);
        assert!(!destination.join("stale.txt").exists());
        assert_eq!(fs::read(destination.join("keep.txt")).unwrap(), b"fresh");
        assert_eq!(fs::read(destination.join("x/y/z.txt")).unwrap(), b"deep");
    }

    #[tokio::test]
    async fn test_missing_source_is_noop() {
        let dir = TempDir::new().unwrap();
        let destination = dir.path().join("live");
        write(&destination.join("untouched.txt"), b"still here");

        let copied = FileTreeReplicator::new()
            .copy_tree(&dir.path().join("absent"), &destination)
            .await
            .unwrap();

        assert_eq!(copied, 0);
        assert!(destination.join("untouched.txt").exists());
    }
}
