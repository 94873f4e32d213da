use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub const DEFAULT_COMPRESSION_LEVEL: u8 = 6;
const MAX_COMPRESSION_LEVEL: u8 = 9;
const ZIP64_THRESHOLD: u64 = u32::MAX as u64;
const COPY_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Archive source {0} does not exist")]
    MissingSource(PathBuf),

    #[error("Failed to write archive {path}: {message}")]
    Write { path: PathBuf, message: String },

    #[error("Archive {path} is corrupt or unreadable: {message}")]
    Corrupt { path: PathBuf, message: String },

    #[error("Archive entry '{0}' escapes the destination directory")]
    UnsafeEntry(String),

    #[error("Failed to extract into {path}: {source}")]
    Extract {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Archive task failed: {0}")]
    Task(String),
}

/// What [`ArchiveCodec::create`] produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveSummary {
    /// Size of the finished archive in bytes.
    pub size: u64,
    pub files: usize,
    /// Paths below a source directory that could not be read and were left out.
    pub skipped: Vec<String>,
}

/// Zip packing and unpacking of file trees.
#[derive(Debug, Clone, Default)]
pub struct ArchiveCodec;

impl ArchiveCodec {
    pub fn new() -> Self {
        Self
    }

    /// Pack `sources` into `output`.
    ///
    /// A directory lands under its own basename, a file at the top level by
    /// its basename. Level 0 stores entries uncompressed. Unreadable entries
    /// inside a source directory are left out and listed in
    /// [`ArchiveSummary::skipped`]; an unreadable source root or any failure
    /// writing the archive is an error. The archive is
    /// assembled in a temporary file next to `output` and only moved into
    /// place once the writer has finished, so a failed run never leaves a
    /// partial archive at `output`.
    pub async fn create(
        &self,
        sources: Vec<PathBuf>,
        output: &Path,
        compression_level: u8,
    ) -> Result<ArchiveSummary, ArchiveError> {
        let output = output.to_path_buf();
        tokio::task::spawn_blocking(move || create_blocking(&sources, &output, compression_level))
            .await
            .map_err(|e| ArchiveError::Task(e.to_string()))?
    }

    /// Unpack `archive` into `destination`, replacing whatever is there.
    /// Returns the number of files written.
    pub async fn extract(&self, archive: &Path, destination: &Path) -> Result<usize, ArchiveError> {
        let archive = archive.to_path_buf();
        let destination = destination.to_path_buf();
        tokio::task::spawn_blocking(move || extract_blocking(&archive, &destination))
            .await
            .map_err(|e| ArchiveError::Task(e.to_string()))?
    }
}

fn entry_options(compression_level: u8) -> SimpleFileOptions {
    let level = compression_level.min(MAX_COMPRESSION_LEVEL);
    if level == 0 {
        SimpleFileOptions::default().compression_method(CompressionMethod::Stored)
    } else {
        SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(level as i64))
    }
}

/// A tree member queued for packing.
#[derive(Debug)]
enum PlannedEntry {
    Dir(String),
    /// `nested` files came out of a directory walk and may be skipped when
    /// they cannot be read; top-level file sources must be readable.
    File {
        path: PathBuf,
        name: String,
        nested: bool,
    },
}

enum AddError {
    /// The source file could not be opened or read.
    Source(String),
    /// The archive itself could not be written.
    Write(String),
}

fn create_blocking(
    sources: &[PathBuf],
    output: &Path,
    compression_level: u8,
) -> Result<ArchiveSummary, ArchiveError> {
    for source in sources {
        if !source.exists() {
            return Err(ArchiveError::MissingSource(source.clone()));
        }
    }

    let mut skipped = Vec::new();
    let entries = plan_entries(sources, &mut skipped).map_err(|message| ArchiveError::Write {
        path: output.to_path_buf(),
        message,
    })?;
    write_archive(entries, output, compression_level, skipped)
}

/// Walk `sources` into the list of entries to pack. Walk errors below a
/// source root are recorded in `skipped`; an unreadable root is an error.
fn plan_entries(sources: &[PathBuf], skipped: &mut Vec<String>) -> Result<Vec<PlannedEntry>, String> {
    let mut entries = Vec::new();
    for source in sources {
        let base = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| format!("source {} has no file name", source.display()))?;

        if source.is_file() {
            entries.push(PlannedEntry::File {
                path: source.clone(),
                name: base,
                nested: false,
            });
            continue;
        }

        for entry in WalkDir::new(source).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() > 0 => {
                    warn!("Skipping unreadable entry while archiving: {}", e);
                    skipped.push(
                        e.path()
                            .map(|p| p.display().to_string())
                            .unwrap_or_else(|| e.to_string()),
                    );
                    continue;
                }
                Err(e) => return Err(e.to_string()),
            };
            let relative = entry
                .path()
                .strip_prefix(source)
                .map_err(|e| e.to_string())?;
            let mut name = base.clone();
            for component in relative.components() {
                name.push('/');
                name.push_str(&component.as_os_str().to_string_lossy());
            }

            if entry.file_type().is_dir() {
                entries.push(PlannedEntry::Dir(format!("{}/", name)));
            } else if entry.file_type().is_file() {
                entries.push(PlannedEntry::File {
                    path: entry.path().to_path_buf(),
                    name,
                    nested: true,
                });
            } else {
                debug!(path = %entry.path().display(), "Skipping non-regular file");
            }
        }
    }
    Ok(entries)
}

fn write_archive(
    entries: Vec<PlannedEntry>,
    output: &Path,
    compression_level: u8,
    mut skipped: Vec<String>,
) -> Result<ArchiveSummary, ArchiveError> {
    let write_err = |message: String| ArchiveError::Write {
        path: output.to_path_buf(),
        message,
    };

    let parent = output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|e| write_err(e.to_string()))?;

    let staging = NamedTempFile::new_in(parent).map_err(|e| write_err(e.to_string()))?;
    let mut writer = ZipWriter::new(staging);
    let file_options = entry_options(compression_level);
    let dir_options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

    let mut files = 0usize;
    for entry in entries {
        match entry {
            PlannedEntry::Dir(name) => {
                writer
                    .add_directory(name, dir_options)
                    .map_err(|e| write_err(e.to_string()))?;
            }
            PlannedEntry::File { path, name, nested } => {
                match add_file(&mut writer, &path, name, file_options) {
                    Ok(()) => files += 1,
                    Err(AddError::Source(message)) if nested => {
                        warn!("Skipping unreadable file while archiving: {}", message);
                        skipped.push(path.display().to_string());
                    }
                    Err(AddError::Source(message)) | Err(AddError::Write(message)) => {
                        return Err(write_err(message));
                    }
                }
            }
        }
    }

    let staging = writer.finish().map_err(|e| write_err(e.to_string()))?;
    staging
        .as_file()
        .sync_all()
        .map_err(|e| write_err(e.to_string()))?;
    staging
        .persist(output)
        .map_err(|e| write_err(e.error.to_string()))?;

    let size = fs::metadata(output)
        .map_err(|e| write_err(e.to_string()))?
        .len();
    debug!(
        archive = %output.display(),
        files,
        skipped = skipped.len(),
        size,
        "Archive written"
    );
    Ok(ArchiveSummary {
        size,
        files,
        skipped,
    })
}

fn add_file(
    writer: &mut ZipWriter<NamedTempFile>,
    path: &Path,
    name: String,
    options: SimpleFileOptions,
) -> Result<(), AddError> {
    let source_err = |e: io::Error| AddError::Source(format!("{}: {}", path.display(), e));
    let mut file = File::open(path).map_err(source_err)?;
    let len = file.metadata().map_err(source_err)?.len();
    writer
        .start_file(name, options.large_file(len >= ZIP64_THRESHOLD))
        .map_err(|e| AddError::Write(e.to_string()))?;

    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    loop {
        let n = match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                // Drop the half-written member so the archive stays consistent
                writer
                    .abort_file()
                    .map_err(|e| AddError::Write(e.to_string()))?;
                return Err(source_err(e));
            }
        };
        writer
            .write_all(&buf[..n])
            .map_err(|e| AddError::Write(e.to_string()))?;
    }
    Ok(())
}

fn extract_blocking(archive: &Path, destination: &Path) -> Result<usize, ArchiveError> {
    let corrupt = |message: String| ArchiveError::Corrupt {
        path: archive.to_path_buf(),
        message,
    };
    let extract_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| ArchiveError::Extract { path, source }
    };

    let file = File::open(archive).map_err(|e| corrupt(e.to_string()))?;
    let mut zip = ZipArchive::new(file).map_err(|e| corrupt(e.to_string()))?;

    if destination.exists() {
        fs::remove_dir_all(destination).map_err(extract_err(destination))?;
    }
    fs::create_dir_all(destination).map_err(extract_err(destination))?;

    let mut files = 0usize;
    for i in 0..zip.len() {
        let mut entry = zip
            .by_index(i)
            .map_err(|e| corrupt(format!("entry {}: {}", i, e)))?;
        let relative = entry
            .enclosed_name()
            .ok_or_else(|| ArchiveError::UnsafeEntry(entry.name().to_string()))?;
        let target = destination.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&target).map_err(extract_err(&target))?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(extract_err(parent))?;
        }
        let mut out = File::create(&target).map_err(extract_err(&target))?;
        // A bad CRC or truncated stream surfaces as a read error here
        io::copy(&mut entry, &mut out).map_err(|e| corrupt(format!("{}: {}", target.display(), e)))?;
        files += 1;
    }

    Ok(files)
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
    async fn test_create_and_extract_preserves_layout() {
        let dir = TempDir::new().unwrap();
        let uploads = dir.path().join("uploads");
        write(&uploads.join("a.txt"), b"alpha");
        write(&uploads.join("nested/deep/b.bin"), &[0u8, 1, 2, 3, 255]);
        fs::create_dir_all(uploads.join("empty")).unwrap();
        let sql = dir.path().join("database-1.sql");
        write(&sql, b"CREATE TABLE t (id int);");

        let out = dir.path().join("out").join("backup.zip");
        let codec = ArchiveCodec::new();
        let summary = codec
            .create(vec![uploads.clone(), sql.clone()], &out, 6)
            .await
            .unwrap();
        assert_eq!(summary.size, fs::metadata(&out).unwrap().len());
        assert_eq!(summary.files, 3);
        assert!(summary.skipped.is_empty());

        let dest = dir.path().join("restored");
        let files = codec.extract(&out, &dest).await.unwrap();
        assert_eq!(files, 3);
        assert_eq!(fs::read(dest.join("uploads/a.txt")).unwrap(), b"alpha");
        assert_eq!(
            fs::read(dest.join("uploads/nested/deep/b.bin")).unwrap(),
            vec![0u8, 1, 2, 3, 255]
        );
        assert!(dest.join("uploads/empty").is_dir());
        assert_eq!(
            fs::read(dest.join("database-1.sql")).unwrap(),
            b"CREATE TABLE t (id int);"
        );
    }

    #[tokio::test]
    async fn test_level_zero_stores_entries() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("data.txt");
        write(&src, &vec![b'a'; 10_000]);

        let stored = dir.path().join("stored.zip");
        let deflated = dir.path().join("deflated.zip");
        let codec = ArchiveCodec::new();
        let stored_size = codec.create(vec![src.clone()], &stored, 0).await.unwrap().size;
        let deflated_size = codec.create(vec![src], &deflated, 9).await.unwrap().size;
        assert!(stored_size > 10_000);
        assert!(deflated_size < stored_size);

        let mut zip = ZipArchive::new(File::open(&stored).unwrap()).unwrap();
        assert_eq!(
            zip.by_name("data.txt").unwrap().compression(),
            CompressionMethod::Stored
        );
    }

    #[tokio::test]
    async fn test_extract_replaces_existing_destination() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("public");
        write(&src.join("index.html"), b"new");
        let archive = dir.path().join("a.zip");
        ArchiveCodec::new()
            .create(vec![src], &archive, 1)
            .await
            .unwrap();

        let dest = dir.path().join("dest");
        write(&dest.join("stale.txt"), b"old");
        ArchiveCodec::new().extract(&archive, &dest).await.unwrap();

        assert!(!dest.join("stale.txt").exists());
        assert_eq!(fs::read(dest.join("public/index.html")).unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_missing_source_leaves_no_archive() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("never.zip");
        let err = ArchiveCodec::new()
            .create(vec![dir.path().join("missing")], &out, 6)
            .await
            .unwrap_err();
        assert!(matches!(err, ArchiveError::MissingSource(_)));
        assert!(!out.exists());
        // No stray temp files either
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_file_vanishing_after_walk_is_skipped() {
        let dir = TempDir::new().unwrap();
        let uploads = dir.path().join("uploads");
        write(&uploads.join("keep.txt"), b"kept");
        write(&uploads.join("gone.txt"), b"deleted mid-backup");

        let mut skipped = Vec::new();
        let entries = plan_entries(&[uploads.clone()], &mut skipped).unwrap();
        assert!(skipped.is_empty());
        fs::remove_file(uploads.join("gone.txt")).unwrap();

        let out = dir.path().join("out.zip");
        let summary = write_archive(entries, &out, 6, skipped).unwrap();
        assert_eq!(summary.files, 1);
        assert_eq!(summary.skipped.len(), 1);
        assert!(summary.skipped[0].ends_with("gone.txt"));

        let mut zip = ZipArchive::new(File::open(&out).unwrap()).unwrap();
        assert!(zip.by_name("uploads/keep.txt").is_ok());
        assert!(zip.by_name("uploads/gone.txt").is_err());
    }

    #[test]
    fn test_vanished_top_level_file_fails() {
        let dir = TempDir::new().unwrap();
        let sql = dir.path().join("database-1.sql");
        write(&sql, b"SELECT 1;");

        let mut skipped = Vec::new();
        let entries = plan_entries(&[sql.clone()], &mut skipped).unwrap();
        fs::remove_file(&sql).unwrap();

        let out = dir.path().join("out.zip");
        let err = write_archive(entries, &out, 6, skipped).unwrap_err();
        assert!(matches!(err, ArchiveError::Write { .. }));
        assert!(!out.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unreadable_subdirectory_is_skipped() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let uploads = dir.path().join("uploads");
        write(&uploads.join("a.txt"), b"alpha");
        let locked = uploads.join("locked");
        write(&locked.join("secret.txt"), b"hidden");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // Privileged users read through mode bits; nothing to exercise then
        if fs::read_dir(&locked).is_ok() {
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let out = dir.path().join("out.zip");
        let result = ArchiveCodec::new().create(vec![uploads.clone()], &out, 6).await;
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        let summary = result.unwrap();
        assert_eq!(summary.files, 1);
        assert_eq!(summary.skipped.len(), 1);
        assert!(summary.skipped[0].ends_with("locked"));
        let mut zip = ZipArchive::new(File::open(&out).unwrap()).unwrap();
        assert!(zip.by_name("uploads/a.txt").is_ok());
    }

    #[tokio::test]
    async fn test_garbage_archive_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("bad.zip");
        write(&archive, b"this is not a zip file");

        let err = ArchiveCodec::new()
            .extract(&archive, &dir.path().join("dest"))
            .await
            .unwrap_err();
        assert!(matches!(err, ArchiveError::Corrupt { .. }));
    }
}
