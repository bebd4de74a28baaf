//! Tree payload parsing and registry linking.

use crate::{GitError, Result};
use bytes::Bytes;
use packrat_storage::{EntryMode, ObjectId, ObjectRegistry, ObjectType, TreeChild, TreeIdx};

/// One `<mode> <name>\0<20-byte id>` entry of a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// Entry mode.
    pub mode: EntryMode,
    /// File or directory name.
    pub name: String,
    /// Id of the child object.
    pub id: ObjectId,
}

/// Parses a raw tree payload into its entries, in stream order.
///
/// The name runs from the first space to the NUL; the id is exactly the
/// 20 bytes after it. Entries need not be sorted.
pub fn parse_tree_entries(raw: &[u8]) -> Result<Vec<TreeEntry>> {
    let mut entries = Vec::new();
    let mut rest = raw;

    while !rest.is_empty() {
        let nul = rest
            .iter()
            .position(|b| *b == 0)
            .ok_or_else(|| GitError::InvalidTree("entry without NUL separator".to_string()))?;
        let header = &rest[..nul];
        let space = header
            .iter()
            .position(|b| *b == b' ')
            .ok_or_else(|| GitError::InvalidTree("entry without mode separator".to_string()))?;

        let mode = EntryMode::parse(&header[..space]).ok_or_else(|| {
            GitError::InvalidTree(format!(
                "unsupported mode {}",
                String::from_utf8_lossy(&header[..space])
            ))
        })?;
        let name = String::from_utf8_lossy(&header[space + 1..]).into_owned();

        let id_end = nul + 1 + ObjectId::LEN;
        let raw_id = rest
            .get(nul + 1..id_end)
            .ok_or_else(|| GitError::InvalidTree(format!("truncated id for entry {:?}", name)))?;
        let id = ObjectId::from_slice(raw_id)?;

        entries.push(TreeEntry { mode, name, id });
        rest = &rest[id_end..];
    }

    Ok(entries)
}

/// Encodes entries in the given order.
pub fn encode_tree(entries: &[TreeEntry]) -> Vec<u8> {
    let mut raw = Vec::new();
    for entry in entries {
        raw.extend_from_slice(entry.mode.as_str().as_bytes());
        raw.push(b' ');
        raw.extend_from_slice(entry.name.as_bytes());
        raw.push(0);
        raw.extend_from_slice(entry.id.as_bytes());
    }
    raw
}

/// Hashes a raw tree, records it and links its children.
///
/// Children that have not been decoded yet become forward references
/// named after their entry. Submodule entries are left out of the links.
/// A tree that was already assembled is returned unchanged.
pub fn assemble_tree(registry: &mut ObjectRegistry, raw: Bytes) -> Result<(ObjectId, TreeIdx)> {
    let id = ObjectId::hash_object(ObjectType::Tree, &raw);
    let parent = registry.upsert_tree(id, None, None);
    if registry.tree(parent).content.is_some() {
        tracing::trace!(%id, "tree already assembled");
        return Ok((id, parent));
    }

    let entries = parse_tree_entries(&raw)?;
    let mut blobs = Vec::new();
    let mut trees = Vec::new();

    for TreeEntry { mode, name, id: child } in entries {
        match mode {
            EntryMode::Tree => {
                let index = registry.upsert_tree(child, Some(&name), None);
                trees.push(TreeChild { name, mode, index });
            }
            mode if mode.is_blob() => {
                let index = registry.upsert_blob(child, Some(&name), None);
                blobs.push(TreeChild { name, mode, index });
            }
            _ => {
                tracing::warn!(tree = %id, entry = %name, commit = %child, "skipping submodule entry");
            }
        }
    }

    tracing::debug!(%id, blobs = blobs.len(), trees = trees.len(), "assembled tree");
    registry.fill_tree(parent, raw, blobs, trees);
    Ok((id, parent))
}
