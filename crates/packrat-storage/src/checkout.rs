//! Working tree checkout.

use crate::store::ensure_dir;
use crate::{EntryMode, ObjectRegistry, Result, StorageError, TreeIdx};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Counts reported by [`checkout_tree`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CheckoutStats {
    /// Files (and symlinks) written.
    pub files: usize,
    /// Directories created below the root.
    pub directories: usize,
    /// Entries skipped because their blob content never arrived.
    pub missing: usize,
}

fn check_entry_name(name: &str) -> Result<()> {
    let unsafe_name = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0')
        || name.eq_ignore_ascii_case(".git");
    if unsafe_name {
        return Err(StorageError::UnsafePath(name.to_string()));
    }
    Ok(())
}

/// Writes the tree at `root` into `dest`, which must already exist.
///
/// The root itself has no name and maps onto `dest`; every child tree
/// becomes a directory named by its entry in the parent.
pub fn checkout_tree(registry: &ObjectRegistry, root: TreeIdx, dest: &Path) -> Result<CheckoutStats> {
    let mut stats = CheckoutStats::default();
    write_tree(registry, root, dest, &mut stats)?;
    tracing::info!(
        files = stats.files,
        directories = stats.directories,
        missing = stats.missing,
        path = %dest.display(),
        "checked out working tree"
    );
    Ok(stats)
}

fn write_tree(
    registry: &ObjectRegistry,
    idx: TreeIdx,
    dir: &Path,
    stats: &mut CheckoutStats,
) -> Result<()> {
    let tree = registry.tree(idx);
    if tree.content.is_none() {
        tracing::warn!(id = %tree.id, path = %dir.display(), "tree content never arrived, directory left empty");
    }

    // A second entry under the same name could follow a symlink written
    // by the first one.
    let mut seen = HashSet::new();
    let mut claim = |name: &str| -> Result<()> {
        check_entry_name(name)?;
        if !seen.insert(name.to_string()) {
            return Err(StorageError::UnsafePath(name.to_string()));
        }
        Ok(())
    };

    for child in &tree.blobs {
        claim(&child.name)?;
        let blob = registry.blob(child.index);
        let path = dir.join(&child.name);
        let Some(content) = &blob.content else {
            tracing::warn!(id = %blob.id, path = %path.display(), "blob content missing, skipping file");
            stats.missing += 1;
            continue;
        };
        write_blob(&path, child.mode, content)?;
        stats.files += 1;
    }

    for child in &tree.trees {
        claim(&child.name)?;
        let path = dir.join(&child.name);
        ensure_dir(&path)?;
        stats.directories += 1;
        write_tree(registry, child.index, &path, stats)?;
    }

    Ok(())
}

fn write_blob(path: &Path, mode: EntryMode, content: &[u8]) -> Result<()> {
    match mode {
        EntryMode::Symlink => write_symlink(path, content),
        EntryMode::Executable => {
            fs::write(path, content).map_err(|e| StorageError::fs(path, e))?;
            set_executable(path)
        }
        _ => fs::write(path, content).map_err(|e| StorageError::fs(path, e)),
    }
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).map_err(|e| StorageError::fs(path, e))
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
fn write_symlink(path: &Path, target: &[u8]) -> Result<()> {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;
    std::os::unix::fs::symlink(OsStr::from_bytes(target), path).map_err(|e| StorageError::fs(path, e))
}

#[cfg(not(unix))]
fn write_symlink(path: &Path, target: &[u8]) -> Result<()> {
    fs::write(path, target).map_err(|e| StorageError::fs(path, e))
}
