//! Ref-delta resolution against the registry.

use crate::clone::CloneState;
use crate::delta::{apply_delta, DeltaRecord};
use crate::tree::assemble_tree;
use crate::{GitError, Result};
use bytes::Bytes;
use packrat_storage::{ObjectId, ObjectRegistry, ObjectType};

/// Outcome counts of [`DeltaResolver::resolve_all`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ResolveStats {
    /// Deltas whose result was added to the registry.
    pub resolved: usize,
    /// Deltas dropped because their base was missing or had no content.
    pub skipped: usize,
}

/// Applies pending ref-deltas once the whole pack has been decoded.
///
/// Deltas are visited once, in pack order. A base must already be
/// concrete when its delta is visited: a base produced by an earlier
/// delta works, a base produced by a later one does not.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeltaResolver;

impl DeltaResolver {
    /// Resolves every pending delta in `state`, draining the list.
    pub fn resolve_all(state: &mut CloneState) -> Result<ResolveStats> {
        let mut stats = ResolveStats::default();

        for delta in std::mem::take(&mut state.deltas) {
            match Self::resolve(&mut state.registry, &delta)? {
                Some((kind, id)) => {
                    tracing::debug!(base = %delta.base, %id, %kind, "resolved delta");
                    stats.resolved += 1;
                }
                None => {
                    tracing::warn!(base = %delta.base, "delta base unavailable, skipping");
                    stats.skipped += 1;
                }
            }
        }

        tracing::info!(resolved = stats.resolved, skipped = stats.skipped, "resolved deltas");
        Ok(stats)
    }

    /// Resolves one delta, returning the kind and id of the result, or
    /// `None` when the base is not usable.
    pub fn resolve(
        registry: &mut ObjectRegistry,
        delta: &DeltaRecord,
    ) -> Result<Option<(ObjectType, ObjectId)>> {
        let Some(base) = registry.find_base(&delta.base) else {
            return Ok(None);
        };
        let output = Bytes::from(apply_delta(&base.content, &delta.instructions)?);

        let id = match base.kind {
            ObjectType::Blob => {
                let id = ObjectId::hash_object(ObjectType::Blob, &output);
                registry.upsert_blob(id, None, Some(output));
                id
            }
            ObjectType::Tree => assemble_tree(registry, output)?.0,
            ObjectType::Commit => {
                return Err(GitError::InvalidDelta(format!(
                    "commit {} cannot be a delta base",
                    delta.base
                )))
            }
        };
        Ok(Some((base.kind, id)))
    }
}
