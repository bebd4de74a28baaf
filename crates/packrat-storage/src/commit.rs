//! Decoded commits and root tree selection.

use crate::{ObjectId, ObjectType};
use bytes::Bytes;

/// A decoded commit.
#[derive(Debug, Clone)]
pub struct CommitRecord {
    /// Content hash.
    pub id: ObjectId,
    /// Header lines and message.
    pub content: Bytes,
}

impl CommitRecord {
    /// Hashes the payload and wraps it.
    pub fn new(content: impl Into<Bytes>) -> Self {
        let content = content.into();
        Self {
            id: ObjectId::hash_object(ObjectType::Commit, &content),
            content,
        }
    }

    /// Returns the hash named by the `tree` header line.
    pub fn tree(&self) -> Option<ObjectId> {
        let hex = self.header(b"tree ")?;
        ObjectId::from_hex(std::str::from_utf8(hex).ok()?.trim()).ok()
    }

    /// Returns the unix timestamp from the `author` header line.
    ///
    /// The line reads `author <name> <<email>> <timestamp> <tz>`; names may
    /// contain spaces or non-UTF-8 bytes, so only the part after the
    /// closing `>` is decoded.
    pub fn author_timestamp(&self) -> Option<i64> {
        let line = self.header(b"author ")?;
        let close = line.iter().rposition(|&b| b == b'>')?;
        let after_email = std::str::from_utf8(&line[close + 1..]).ok()?;
        after_email.split_whitespace().next()?.parse().ok()
    }

    /// Value of the first header line starting with `key`.
    fn header(&self, key: &[u8]) -> Option<&[u8]> {
        // Headers end at the first blank line; the message may be anything.
        let end = self
            .content
            .windows(2)
            .position(|w| w == b"\n\n")
            .unwrap_or(self.content.len());
        self.content[..end]
            .split(|&b| b == b'\n')
            .find_map(|line| line.strip_prefix(key))
    }
}

/// Picks the tree of the most recently authored commit.
///
/// This stands in for walking ref -> commit -> parents: with a single
/// fetched ref, the newest author timestamp approximates the tip. With
/// several unrelated histories in one pack it can choose the wrong tree.
#[derive(Debug, Default, Clone)]
pub struct CommitSelector {
    best: Option<(i64, ObjectId)>,
}

impl CommitSelector {
    /// Creates a selector with nothing selected.
    pub fn new() -> Self {
        Self::default()
    }

    /// Considers a commit; returns true if it became the selection.
    ///
    /// Ties keep the earlier commit. Commits without a parseable tree or
    /// author timestamp are ignored.
    pub fn observe(&mut self, commit: &CommitRecord) -> bool {
        let (Some(tree), Some(timestamp)) = (commit.tree(), commit.author_timestamp()) else {
            tracing::warn!(id = %commit.id, "commit has no usable tree/author header, not selectable");
            return false;
        };

        match self.best {
            Some((max, _)) if timestamp <= max => false,
            _ => {
                tracing::debug!(id = %commit.id, tree = %tree, timestamp, "selected newer commit");
                self.best = Some((timestamp, tree));
                true
            }
        }
    }

    /// The selected root tree hash.
    pub fn root(&self) -> Option<ObjectId> {
        self.best.map(|(_, tree)| tree)
    }

    /// The timestamp of the selected commit.
    pub fn timestamp(&self) -> Option<i64> {
        self.best.map(|(ts, _)| ts)
    }
}
