//! The clone pipeline: discover, fetch, decode, resolve, materialize.

use crate::config::CloneConfig;
use crate::delta::DeltaRecord;
use crate::pack::{PackDecoder, PackEntry};
use crate::protocol::{RemoteRef, Transport};
use crate::resolve::{DeltaResolver, ResolveStats};
use crate::sideband::extract_pack;
use crate::tree::assemble_tree;
use crate::{GitError, Result};
use packrat_storage::{
    checkout_tree, init, write_head, write_object_store, write_ref, CheckoutStats, CommitRecord,
    CommitSelector, ObjectId, ObjectRegistry, ObjectType, Reference, TreeIdx,
};
use std::path::{Path, PathBuf};

/// Everything decoded from one pack.
#[derive(Debug, Default)]
pub struct CloneState {
    /// Blobs and trees by hash.
    pub registry: ObjectRegistry,
    /// Commits in pack order.
    pub commits: Vec<CommitRecord>,
    /// Running root tree selection.
    pub selector: CommitSelector,
    /// Ref-deltas waiting for [`DeltaResolver`].
    pub deltas: Vec<DeltaRecord>,
}

impl CloneState {
    /// Creates empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one decoded pack entry.
    pub fn ingest(&mut self, entry: PackEntry) -> Result<()> {
        match entry {
            PackEntry::Commit(content) => {
                let commit = CommitRecord::new(content);
                self.selector.observe(&commit);
                self.commits.push(commit);
            }
            PackEntry::Tree(content) => {
                assemble_tree(&mut self.registry, content)?;
            }
            PackEntry::Blob(content) => {
                let id = ObjectId::hash_object(ObjectType::Blob, &content);
                self.registry.upsert_blob(id, None, Some(content));
            }
            PackEntry::RefDelta { base, instructions } => {
                self.deltas.push(DeltaRecord { base, instructions });
            }
        }
        Ok(())
    }

    /// Returns the selected root tree, which must have been decoded.
    pub fn root_tree(&self) -> Result<(ObjectId, TreeIdx)> {
        let root = self
            .selector
            .root()
            .ok_or_else(|| GitError::Protocol("pack contains no usable commit".to_string()))?;
        self.registry
            .tree_idx(&root)
            .filter(|idx| self.registry.tree(*idx).content.is_some())
            .map(|idx| (root, idx))
            .ok_or_else(|| GitError::ObjectNotFound(format!("root tree {}", root)))
    }
}

impl PackDecoder<'_> {
    /// Decodes every remaining entry into `state`.
    pub fn decode(mut self, state: &mut CloneState) -> Result<usize> {
        let header = self.header();
        let mut decoded = 0;
        while let Some(entry) = self.next_entry()? {
            state.ingest(entry)?;
            decoded += 1;
        }
        tracing::info!(
            version = header.version,
            objects = decoded,
            declared = header.object_count,
            commits = state.commits.len(),
            blobs = state.registry.blob_count(),
            trees = state.registry.tree_count(),
            deltas = state.deltas.len(),
            "decoded pack"
        );
        Ok(decoded)
    }
}

/// Decodes a pack stream into fresh state.
pub fn decode_pack(pack: &[u8]) -> Result<CloneState> {
    let mut state = CloneState::new();
    PackDecoder::new(pack)?.decode(&mut state)?;
    Ok(state)
}

/// What a finished clone produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneSummary {
    /// Working directory of the new repository.
    pub destination: PathBuf,
    /// Ref the clone was made from.
    pub head: RemoteRef,
    /// Tree that was checked out.
    pub root_tree: ObjectId,
    /// Loose objects written.
    pub objects_written: usize,
    /// Delta resolution counts.
    pub deltas: ResolveStats,
    /// Checkout counts.
    pub checkout: CheckoutStats,
}

/// Derives a directory name from a remote URL: the last path segment
/// with any `.git` suffix removed.
pub fn destination_for(url: &str) -> Result<PathBuf> {
    let trimmed = url.trim_end_matches('/');
    let last = trimmed.rsplit('/').next().unwrap_or(trimmed);
    let name = last.strip_suffix(".git").unwrap_or(last);

    if name.is_empty() || name == "." || name == ".." || name.contains(':') {
        return Err(GitError::Destination(format!(
            "cannot derive a directory name from {:?}",
            url
        )));
    }
    Ok(PathBuf::from(name))
}

/// Points `HEAD` at the cloned ref.
///
/// A symref target becomes a branch ref plus a symbolic `HEAD`; without
/// one, `HEAD` is detached at the ref's id.
pub fn write_remote_head(git_dir: &Path, remote: &RemoteRef) -> Result<()> {
    match &remote.symref_target {
        Some(target) => {
            write_ref(git_dir, target, &remote.id)?;
            write_head(git_dir, &Reference::Symbolic(target.clone()))?;
        }
        None => write_head(git_dir, &Reference::Direct(remote.id))?,
    }
    Ok(())
}

/// Writes the object store and working tree for decoded state.
///
/// Nothing is written unless the root tree is available.
pub fn materialize(state: &CloneState, work_dir: &Path) -> Result<(ObjectId, usize, CheckoutStats)> {
    let (root, root_idx) = state.root_tree()?;
    let git_dir = init(work_dir)?;
    let written = write_object_store(&git_dir, &state.registry, &state.commits)?;
    let checkout = checkout_tree(&state.registry, root_idx, work_dir)?;
    Ok((root, written, checkout))
}

/// Clones `url` into `dest`, or into a new directory named after the URL.
pub fn clone_repository<T: Transport + ?Sized>(
    transport: &T,
    url: &str,
    dest: Option<&Path>,
    config: &CloneConfig,
) -> Result<CloneSummary> {
    let destination = match dest {
        Some(path) => path.to_path_buf(),
        None => {
            let derived = destination_for(url)?;
            if derived.exists() {
                return Err(GitError::Destination(format!(
                    "{} already exists",
                    derived.display()
                )));
            }
            derived
        }
    };
    tracing::info!(%url, destination = %destination.display(), "cloning");

    let head = transport.discover_ref(url)?;
    let body = transport.fetch_pack(url, &head)?;
    let pack = extract_pack(&body)?;

    let mut state = decode_pack(&pack)?;
    let deltas = DeltaResolver::resolve_all(&mut state)?;

    let (root_tree, objects_written, checkout) = materialize(&state, &destination)?;
    if config.write_head {
        write_remote_head(&destination.join(packrat_storage::GIT_DIR), &head)?;
    }

    let summary = CloneSummary {
        destination,
        head,
        root_tree,
        objects_written,
        deltas,
        checkout,
    };
    tracing::info!(
        objects = summary.objects_written,
        files = summary.checkout.files,
        skipped_deltas = summary.deltas.skipped,
        "clone complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack::PackBuilder;
    use crate::tree::{encode_tree, TreeEntry};
    use bytes::Bytes;
    use packrat_storage::EntryMode;

    fn commit_text(tree: &ObjectId, timestamp: i64) -> Vec<u8> {
        format!(
            "tree {}\nauthor A U Thor <a@example.com> {} +0000\ncommitter A U Thor <a@example.com> {} +0000\n\nmsg\n",
            tree, timestamp, timestamp
        )
        .into_bytes()
    }

    #[test]
    fn test_destination_for() {
        let cases = [
            ("https://github.com/user/repo.git", "repo"),
            ("https://github.com/user/repo", "repo"),
            ("https://github.com/user/repo.git/", "repo"),
            ("http://localhost:8080/a/b/project", "project"),
        ];
        for (url, expected) in cases {
            assert_eq!(destination_for(url).unwrap(), PathBuf::from(expected), "{url}");
        }
        assert!(destination_for("https://example.com/.git").is_err());
        assert!(destination_for("/").is_err());
        assert!(destination_for("https://").is_err());
    }

    #[test]
    fn test_ingest_routes_entries() {
        let mut state = CloneState::new();
        let tree = ObjectId::from_bytes([4; 20]);
        state.ingest(PackEntry::Commit(Bytes::from(commit_text(&tree, 10)))).unwrap();
        state.ingest(PackEntry::Blob(Bytes::from_static(b"data"))).unwrap();
        state
            .ingest(PackEntry::RefDelta {
                base: tree,
                instructions: Bytes::from_static(b"\x00\x00"),
            })
            .unwrap();

        assert_eq!(state.commits.len(), 1);
        assert_eq!(state.selector.root(), Some(tree));
        assert_eq!(state.registry.blob_count(), 1);
        assert_eq!(state.deltas.len(), 1);
    }

    #[test]
    fn test_selector_follows_max_timestamp_across_pack() {
        let trees: Vec<ObjectId> = (1..=3).map(|i| ObjectId::from_bytes([i; 20])).collect();
        let mut builder = PackBuilder::new();
        for (tree, ts) in trees.iter().zip([100, 50, 200]) {
            builder.add(ObjectType::Commit, commit_text(tree, ts));
        }
        let pack = builder.build().unwrap();

        let state = decode_pack(&pack).unwrap();
        assert_eq!(state.commits.len(), 3);
        assert_eq!(state.selector.root(), Some(trees[2]));
        assert_eq!(state.selector.timestamp(), Some(200));
    }

    #[test]
    fn test_root_tree_must_be_decoded() {
        let mut state = CloneState::new();
        assert!(matches!(state.root_tree(), Err(GitError::Protocol(_))));

        let missing = ObjectId::from_bytes([8; 20]);
        state.ingest(PackEntry::Commit(Bytes::from(commit_text(&missing, 1)))).unwrap();
        assert!(matches!(state.root_tree(), Err(GitError::ObjectNotFound(_))));
    }

    #[test]
    fn test_materialize_writes_nothing_without_root() {
        let tmp = tempfile::tempdir().unwrap();
        let work = tmp.path().join("out");
        let state = CloneState::new();
        assert!(materialize(&state, &work).is_err());
        assert!(!work.exists());
    }

    #[test]
    fn test_materialize_subdirectories() {
        let mut builder = PackBuilder::new();
        let file = ObjectId::hash_object(ObjectType::Blob, b"pub fn x() {}\n");
        let sub = encode_tree(&[TreeEntry {
            mode: EntryMode::Regular,
            name: "lib.rs".to_string(),
            id: file,
        }]);
        let sub_id = ObjectId::hash_object(ObjectType::Tree, &sub);
        let root = encode_tree(&[TreeEntry {
            mode: EntryMode::Tree,
            name: "src".to_string(),
            id: sub_id,
        }]);
        let root_id = ObjectId::hash_object(ObjectType::Tree, &root);

        // parents before children, as forward references
        builder
            .add(ObjectType::Commit, commit_text(&root_id, 1))
            .add(ObjectType::Tree, root)
            .add(ObjectType::Tree, sub)
            .add(ObjectType::Blob, b"pub fn x() {}\n".to_vec());
        let state = decode_pack(&builder.build().unwrap()).unwrap();

        let tmp = tempfile::tempdir().unwrap();
        let (root, written, checkout) = materialize(&state, tmp.path()).unwrap();
        assert_eq!(root, root_id);
        assert_eq!(written, 4);
        assert_eq!(checkout.files, 1);
        assert_eq!(checkout.directories, 1);
        assert_eq!(
            std::fs::read(tmp.path().join("src").join("lib.rs")).unwrap(),
            b"pub fn x() {}\n"
        );
    }

    #[test]
    fn test_write_remote_head() {
        let tmp = tempfile::tempdir().unwrap();
        let git_dir = init(tmp.path()).unwrap();
        let id = ObjectId::from_bytes([0xab; 20]);

        let symbolic = RemoteRef {
            id,
            name: "HEAD".to_string(),
            symref_target: Some("refs/heads/trunk".to_string()),
        };
        write_remote_head(&git_dir, &symbolic).unwrap();
        assert_eq!(
            std::fs::read_to_string(git_dir.join("HEAD")).unwrap(),
            "ref: refs/heads/trunk\n"
        );
        assert_eq!(
            std::fs::read_to_string(git_dir.join("refs/heads/trunk")).unwrap(),
            format!("{}\n", id)
        );

        let detached = RemoteRef {
            symref_target: None,
            ..symbolic
        };
        write_remote_head(&git_dir, &detached).unwrap();
        assert_eq!(
            std::fs::read_to_string(git_dir.join("HEAD")).unwrap(),
            format!("{}\n", id)
        );
    }
}
