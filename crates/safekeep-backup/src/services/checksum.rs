use md5::{Digest, Md5};
use sha2::Sha256;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;

const READ_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    Md5,
    Sha256,
}

#[derive(Error, Debug)]
pub enum ChecksumError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Checksum task failed: {0}")]
    Task(String),
}

/// Hex digests of files, computed in fixed-size chunks.
#[derive(Debug, Clone, Default)]
pub struct ChecksumEngine;

impl ChecksumEngine {
    pub fn new() -> Self {
        Self
    }

    pub async fn checksum(
        &self,
        path: &Path,
        algorithm: ChecksumAlgorithm,
    ) -> Result<String, ChecksumError> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || Self::checksum_blocking(&path, algorithm))
            .await
            .map_err(|e| ChecksumError::Task(e.to_string()))?
    }

    /// Both digests in one pass over the file: `(md5, sha256)`.
    pub async fn checksum_pair(&self, path: &Path) -> Result<(String, String), ChecksumError> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let mut md5 = Md5::new();
            let mut sha256 = Sha256::new();
            stream_file(&path, |chunk| {
                md5.update(chunk);
                sha256.update(chunk);
            })?;
            Ok((hex::encode(md5.finalize()), hex::encode(sha256.finalize())))
        })
        .await
        .map_err(|e| ChecksumError::Task(e.to_string()))?
    }

    pub fn checksum_blocking(
        path: &Path,
        algorithm: ChecksumAlgorithm,
    ) -> Result<String, ChecksumError> {
        match algorithm {
            ChecksumAlgorithm::Md5 => digest_file::<Md5>(path),
            ChecksumAlgorithm::Sha256 => digest_file::<Sha256>(path),
        }
    }
}

fn digest_file<D: Digest>(path: &Path) -> Result<String, ChecksumError> {
    let mut hasher = D::new();
    stream_file(path, |chunk| hasher.update(chunk))?;
    Ok(hex::encode(hasher.finalize()))
}

fn stream_file(path: &Path, mut sink: impl FnMut(&[u8])) -> Result<(), ChecksumError> {
    let io_err = |source| ChecksumError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(io_err)?;
    let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, file);
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let read = reader.read(&mut buffer).map_err(io_err)?;
        if read == 0 {
            return Ok(());
        }
        sink(&buffer[..read]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_known_digests() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hello.txt");
        fs::write(&path, b"hello world").unwrap();

        let engine = ChecksumEngine::new();
        assert_eq!(
            engine.checksum(&path, ChecksumAlgorithm::Md5).await.unwrap(),
            "5eb63bbbe01eeed093cb22bb8f5acdc3"
        );
        assert_eq!(
            engine.checksum(&path, ChecksumAlgorithm::Sha256).await.unwrap(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[tokio::test]
    async fn test_pair_matches_single_digests() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blob.bin");
        // Larger than one read buffer so chunking is exercised
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        fs::write(&path, &data).unwrap();

        let engine = ChecksumEngine::new();
        let (md5, sha256) = engine.checksum_pair(&path).await.unwrap();
        assert_eq!(md5, engine.checksum(&path, ChecksumAlgorithm::Md5).await.unwrap());
        assert_eq!(
            sha256,
            engine.checksum(&path, ChecksumAlgorithm::Sha256).await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_single_byte_change_changes_digest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.sql");
        fs::write(&path, b"INSERT INTO t VALUES (1);").unwrap();

        let engine = ChecksumEngine::new();
        let first = engine.checksum(&path, ChecksumAlgorithm::Md5).await.unwrap();
        let again = engine.checksum(&path, ChecksumAlgorithm::Md5).await.unwrap();
        assert_eq!(first, again);

        fs::write(&path, b"INSERT INTO t VALUES (2);").unwrap();
        let changed = engine.checksum(&path, ChecksumAlgorithm::Md5).await.unwrap();
        assert_ne!(first, changed);
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = ChecksumEngine::new()
            .checksum(&dir.path().join("nope"), ChecksumAlgorithm::Sha256)
            .await
            .unwrap_err();
        assert!(matches!(err, ChecksumError::Io { .. }));
    }
}
