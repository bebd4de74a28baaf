//! Reference files under `.git`.

use crate::store::ensure_dir;
use crate::{ObjectId, Result, StorageError};
use std::fs;
use std::path::Path;

/// What a reference points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    /// Direct reference to an object.
    Direct(ObjectId),
    /// Symbolic reference (e.g., HEAD -> refs/heads/main).
    Symbolic(String),
}

impl Reference {
    /// Returns the on-disk file content for this reference.
    pub fn to_file_content(&self) -> String {
        match self {
            Self::Direct(id) => format!("{}\n", id),
            Self::Symbolic(target) => format!("ref: {}\n", target),
        }
    }
}

fn check_ref_name(name: &str) -> Result<()> {
    let valid = name.starts_with("refs/")
        && name
            .split('/')
            .all(|part| !part.is_empty() && part != "." && part != ".." && !part.ends_with(".lock"));
    if valid {
        Ok(())
    } else {
        Err(StorageError::UnsafePath(name.to_string()))
    }
}

/// Writes `refs/...` so that it points at `id`, creating parent
/// directories as needed.
pub fn write_ref(git_dir: &Path, name: &str, id: &ObjectId) -> Result<()> {
    check_ref_name(name)?;
    let path = git_dir.join(name);
    let mut dir = git_dir.to_path_buf();
    let parts: Vec<&str> = name.split('/').collect();
    for part in &parts[..parts.len() - 1] {
        dir.push(part);
        ensure_dir(&dir)?;
    }
    fs::write(&path, Reference::Direct(*id).to_file_content())
        .map_err(|e| StorageError::fs(&path, e))
}

/// Writes `.git/HEAD`.
pub fn write_head(git_dir: &Path, head: &Reference) -> Result<()> {
    if let Reference::Symbolic(target) = head {
        check_ref_name(target)?;
    }
    let path = git_dir.join("HEAD");
    fs::write(&path, head.to_file_content()).map_err(|e| StorageError::fs(&path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_symbolic_head_and_branch() {
        let tmp = tempfile::tempdir().unwrap();
        let id = ObjectId::from_bytes([0xaa; 20]);

        write_ref(tmp.path(), "refs/heads/feature/x", &id).unwrap();
        write_head(tmp.path(), &Reference::Symbolic("refs/heads/feature/x".into())).unwrap();

        assert_eq!(
            fs::read_to_string(tmp.path().join("refs/heads/feature/x")).unwrap(),
            format!("{}\n", id)
        );
        assert_eq!(
            fs::read_to_string(tmp.path().join("HEAD")).unwrap(),
            "ref: refs/heads/feature/x\n"
        );
    }

    #[test]
    fn test_detached_head() {
        let tmp = tempfile::tempdir().unwrap();
        let id = ObjectId::from_bytes([0x01; 20]);
        write_head(tmp.path(), &Reference::Direct(id)).unwrap();
        assert_eq!(
            fs::read_to_string(tmp.path().join("HEAD")).unwrap(),
            format!("{}\n", id)
        );
    }

    #[test]
    fn test_rejects_escaping_ref_names() {
        let tmp = tempfile::tempdir().unwrap();
        let id = ObjectId::from_bytes([0; 20]);
        assert!(write_ref(tmp.path(), "refs/../../etc", &id).is_err());
        assert!(write_ref(tmp.path(), "HEAD", &id).is_err());
        assert!(write_head(tmp.path(), &Reference::Symbolic("refs//x".into())).is_err());
    }
}
