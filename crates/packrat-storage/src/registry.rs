//! Deduplicating, content-addressed table of blob and tree records.
//!
//! Records live in per-kind arenas and are addressed by stable indices.
//! A record may be created before its bytes are known (a forward
//! reference from a tree entry); later upserts fill the missing name or
//! content in place, so indices held in parent trees stay valid.

use crate::{EntryMode, ObjectId, ObjectType};
use bytes::Bytes;
use std::collections::HashMap;

/// Stable index of a blob record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlobIdx(usize);

/// Stable index of a tree record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TreeIdx(usize);

/// A file's content, keyed by its hash.
#[derive(Debug, Clone)]
pub struct BlobRecord {
    /// Content hash.
    pub id: ObjectId,
    /// Name from the first tree entry that referenced this blob.
    pub name: Option<String>,
    /// Raw content; `None` until the blob or its delta is decoded.
    pub content: Option<Bytes>,
}

/// A link from a tree to one of its children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeChild<I> {
    /// Entry name within the parent tree.
    pub name: String,
    /// Entry mode.
    pub mode: EntryMode,
    /// Index of the child record.
    pub index: I,
}

/// A directory listing, keyed by its hash.
#[derive(Debug, Clone)]
pub struct TreeRecord {
    /// Content hash.
    pub id: ObjectId,
    /// Name from the first tree entry that referenced this tree.
    pub name: Option<String>,
    /// Raw encoded entries, kept so the tree can serve as a delta base.
    pub content: Option<Bytes>,
    /// Blob children in encounter order.
    pub blobs: Vec<TreeChild<BlobIdx>>,
    /// Tree children in encounter order.
    pub trees: Vec<TreeChild<TreeIdx>>,
}

impl TreeRecord {
    fn empty(id: ObjectId) -> Self {
        Self {
            id,
            name: None,
            content: None,
            blobs: Vec::new(),
            trees: Vec::new(),
        }
    }
}

/// A concrete object that a ref-delta can be applied against.
#[derive(Debug, Clone)]
pub struct BaseObject {
    /// Kind of the base, which is also the kind of the delta's result.
    pub kind: ObjectType,
    /// The base's raw content.
    pub content: Bytes,
}

/// Content-addressed registry of blobs and trees for one clone.
#[derive(Debug, Default)]
pub struct ObjectRegistry {
    blobs: Vec<BlobRecord>,
    blob_index: HashMap<ObjectId, BlobIdx>,
    trees: Vec<TreeRecord>,
    tree_index: HashMap<ObjectId, TreeIdx>,
}

impl ObjectRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a blob by hash.
    pub fn get_blob(&self, id: &ObjectId) -> Option<&BlobRecord> {
        self.blob_index.get(id).map(|idx| &self.blobs[idx.0])
    }

    /// Looks up a tree by hash.
    pub fn get_tree(&self, id: &ObjectId) -> Option<&TreeRecord> {
        self.tree_index.get(id).map(|idx| &self.trees[idx.0])
    }

    /// Returns the index of a tree, if present.
    pub fn tree_idx(&self, id: &ObjectId) -> Option<TreeIdx> {
        self.tree_index.get(id).copied()
    }

    /// Returns the blob at `idx`.
    pub fn blob(&self, idx: BlobIdx) -> &BlobRecord {
        &self.blobs[idx.0]
    }

    /// Returns the tree at `idx`.
    pub fn tree(&self, idx: TreeIdx) -> &TreeRecord {
        &self.trees[idx.0]
    }

    /// Inserts a blob or fills its missing name/content.
    pub fn upsert_blob(
        &mut self,
        id: ObjectId,
        name: Option<&str>,
        content: Option<Bytes>,
    ) -> BlobIdx {
        let idx = match self.blob_index.get(&id) {
            Some(idx) => *idx,
            None => {
                let idx = BlobIdx(self.blobs.len());
                self.blobs.push(BlobRecord {
                    id,
                    name: None,
                    content: None,
                });
                self.blob_index.insert(id, idx);
                idx
            }
        };

        let record = &mut self.blobs[idx.0];
        if record.name.is_none() {
            record.name = name.map(str::to_owned);
        }
        if record.content.is_none() {
            record.content = content;
        }
        idx
    }

    /// Inserts a tree or fills its missing name/content. Child links are
    /// never touched here; see [`ObjectRegistry::fill_tree`].
    pub fn upsert_tree(
        &mut self,
        id: ObjectId,
        name: Option<&str>,
        content: Option<Bytes>,
    ) -> TreeIdx {
        let idx = match self.tree_index.get(&id) {
            Some(idx) => *idx,
            None => {
                let idx = TreeIdx(self.trees.len());
                self.trees.push(TreeRecord::empty(id));
                self.tree_index.insert(id, idx);
                idx
            }
        };

        let record = &mut self.trees[idx.0];
        if record.name.is_none() {
            record.name = name.map(str::to_owned);
        }
        if record.content.is_none() {
            record.content = content;
        }
        idx
    }

    /// Records a parsed tree's content and child links.
    ///
    /// Returns false and leaves the record alone if it was already
    /// filled; identical hashes imply identical entries.
    pub fn fill_tree(
        &mut self,
        idx: TreeIdx,
        content: Bytes,
        blobs: Vec<TreeChild<BlobIdx>>,
        trees: Vec<TreeChild<TreeIdx>>,
    ) -> bool {
        let record = &mut self.trees[idx.0];
        if record.content.is_some() {
            return false;
        }
        record.content = Some(content);
        record.blobs = blobs;
        record.trees = trees;
        true
    }

    /// Finds a concrete delta base: blobs first, then trees. Records
    /// that exist only as forward references are not usable.
    pub fn find_base(&self, id: &ObjectId) -> Option<BaseObject> {
        if let Some(blob) = self.get_blob(id) {
            return blob.content.clone().map(|content| BaseObject {
                kind: ObjectType::Blob,
                content,
            });
        }
        self.get_tree(id).and_then(|tree| {
            tree.content.clone().map(|content| BaseObject {
                kind: ObjectType::Tree,
                content,
            })
        })
    }

    /// Iterates over all blob records.
    pub fn blobs(&self) -> impl Iterator<Item = &BlobRecord> {
        self.blobs.iter()
    }

    /// Iterates over all tree records.
    pub fn trees(&self) -> impl Iterator<Item = &TreeRecord> {
        self.trees.iter()
    }

    /// Number of blob records.
    pub fn blob_count(&self) -> usize {
        self.blobs.len()
    }

    /// Number of tree records.
    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    /// Total number of records.
    pub fn len(&self) -> usize {
        self.blobs.len() + self.trees.len()
    }

    /// Returns true if the registry holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
