//! Loose object store on disk.
//!
//! Objects are written as `<git dir>/objects/<2 hex>/<38 hex>`, each file
//! holding the zlib-compressed `"<type> <len>\0<payload>"`, so the result
//! is readable by git itself.

use crate::{CommitRecord, ObjectId, ObjectRegistry, ObjectType, Result, StorageError};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Name of the repository metadata directory.
pub const GIT_DIR: &str = ".git";

/// Compresses a payload into loose-object form.
pub fn encode_loose(object_type: ObjectType, data: &[u8]) -> Result<Vec<u8>> {
    let header = object_type.header(data.len());
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(header.as_bytes())
        .map_err(|e| StorageError::Compression(e.to_string()))?;
    encoder
        .write_all(data)
        .map_err(|e| StorageError::Compression(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| StorageError::Compression(e.to_string()))
}

/// Decompresses a loose object, returning its type and payload.
pub fn decode_loose(compressed: &[u8]) -> Result<(ObjectType, Vec<u8>)> {
    let mut decoder = ZlibDecoder::new(compressed);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| StorageError::Compression(e.to_string()))?;

    let null_pos = decompressed
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| StorageError::InvalidObject("missing null byte in header".to_string()))?;

    let header = String::from_utf8_lossy(&decompressed[..null_pos]);
    let (kind, size) = header
        .split_once(' ')
        .ok_or_else(|| StorageError::InvalidObject(format!("invalid header: {}", header)))?;

    let object_type = ObjectType::parse(kind)?;
    let size: usize = size
        .parse()
        .map_err(|_| StorageError::InvalidObject("invalid size".to_string()))?;

    let data = decompressed.split_off(null_pos + 1);
    if data.len() != size {
        return Err(StorageError::InvalidObject(format!(
            "size mismatch: header says {}, payload has {}",
            size,
            data.len()
        )));
    }
    Ok((object_type, data))
}

/// Creates `path` if missing; an existing directory is fine, a symlink
/// to one is not.
pub(crate) fn ensure_dir(path: &Path) -> Result<()> {
    match fs::create_dir(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => match fs::symlink_metadata(path) {
            Ok(meta) if meta.is_dir() => Ok(()),
            _ => Err(StorageError::fs(path, e)),
        },
        Err(e) => Err(StorageError::fs(path, e)),
    }
}

/// Initializes an empty repository layout under `work_dir`.
///
/// Creates `.git/objects`, `.git/refs/heads`, `.git/refs/tags` and a
/// `HEAD` pointing at `refs/heads/main`. Existing directories are kept.
/// Returns the path of the `.git` directory.
pub fn init(work_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(work_dir).map_err(|e| StorageError::fs(work_dir, e))?;
    let git_dir = work_dir.join(GIT_DIR);
    for dir in [
        git_dir.clone(),
        git_dir.join("objects"),
        git_dir.join("refs"),
        git_dir.join("refs").join("heads"),
        git_dir.join("refs").join("tags"),
    ] {
        ensure_dir(&dir)?;
    }

    let head = git_dir.join("HEAD");
    if !head.exists() {
        fs::write(&head, b"ref: refs/heads/main\n").map_err(|e| StorageError::fs(&head, e))?;
    }

    tracing::debug!(path = %git_dir.display(), "initialized repository layout");
    Ok(git_dir)
}

/// Writes loose objects into a `.git/objects` directory.
#[derive(Debug, Clone)]
pub struct LooseObjectWriter {
    objects_dir: PathBuf,
}

impl LooseObjectWriter {
    /// Creates a writer for the objects directory of `git_dir`.
    pub fn new(git_dir: &Path) -> Self {
        Self {
            objects_dir: git_dir.join("objects"),
        }
    }

    /// Returns the path an object would be written to.
    pub fn path_for(&self, id: &ObjectId) -> PathBuf {
        let (dir, file) = id.loose_parts();
        self.objects_dir.join(dir).join(file)
    }

    /// Writes one object and returns its path.
    pub fn write(&self, object_type: ObjectType, id: &ObjectId, data: &[u8]) -> Result<PathBuf> {
        ensure_dir(&self.objects_dir)?;
        let path = self.path_for(id);
        if let Some(fanout) = path.parent() {
            ensure_dir(fanout)?;
        }
        let encoded = encode_loose(object_type, data)?;
        fs::write(&path, encoded).map_err(|e| StorageError::fs(&path, e))?;
        Ok(path)
    }
}

/// Writes every concrete registry record and every commit as a loose
/// object. Records that never received content are skipped.
///
/// Returns the number of objects written.
pub fn write_object_store(
    git_dir: &Path,
    registry: &ObjectRegistry,
    commits: &[CommitRecord],
) -> Result<usize> {
    let writer = LooseObjectWriter::new(git_dir);
    let mut written = 0;

    for blob in registry.blobs() {
        match &blob.content {
            Some(content) => {
                writer.write(ObjectType::Blob, &blob.id, content)?;
                written += 1;
            }
            None => tracing::warn!(id = %blob.id, "blob content never arrived, not stored"),
        }
    }

    for tree in registry.trees() {
        match &tree.content {
            Some(content) => {
                writer.write(ObjectType::Tree, &tree.id, content)?;
                written += 1;
            }
            None => tracing::warn!(id = %tree.id, "tree content never arrived, not stored"),
        }
    }

    for commit in commits {
        writer.write(ObjectType::Commit, &commit.id, &commit.content)?;
        written += 1;
    }

    tracing::info!(count = written, path = %git_dir.display(), "wrote object store");
    Ok(written)
}
