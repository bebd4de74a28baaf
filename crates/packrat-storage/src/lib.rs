//! Object storage for packrat.
//!
//! This crate holds everything a clone needs once objects have been
//! decoded: content-addressed identities, the deduplicating object
//! registry, commit selection, and the writers that materialize the
//! `.git` object store and the checked-out working tree.

mod checkout;
mod commit;
mod error;
mod object;
mod refs;
mod registry;
mod store;

pub use checkout::{checkout_tree, CheckoutStats};
pub use commit::{CommitRecord, CommitSelector};
pub use error::StorageError;
pub use object::{EntryMode, ObjectId, ObjectType};
pub use refs::{write_head, write_ref, Reference};
pub use registry::{BaseObject, BlobIdx, BlobRecord, ObjectRegistry, TreeChild, TreeIdx, TreeRecord};
pub use store::{
    decode_loose, encode_loose, init, write_object_store, LooseObjectWriter, GIT_DIR,
};

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
