//! Git protocol and pack handling for packrat.
//!
//! This crate fetches a repository over protocol v2 smart HTTP, decodes
//! the pack it receives, resolves ref-deltas, links trees into the
//! object registry and hands the result to `packrat-storage` to be
//! written out as a `.git` directory and a working tree.

mod clone;
mod config;
mod delta;
mod error;
mod pack;
mod pktline;
mod protocol;
mod resolve;
mod sideband;
mod tree;

pub use clone::{
    clone_repository, decode_pack, destination_for, materialize, write_remote_head, CloneState,
    CloneSummary,
};
pub use config::CloneConfig;
pub use delta::{apply_delta, parse_delta, DeltaHeader, DeltaInstruction, DeltaRecord};
pub use error::GitError;
pub use pack::{inflate, read_entry_header, EntryHeader, PackBuilder, PackDecoder, PackEntry, PackHeader};
pub use pktline::{PktLine, PktLineReader, PktLineWriter};
pub use protocol::{
    fetch_request, ls_refs_request, parse_ls_refs, HttpTransport, RemoteRef, Transport,
};
pub use resolve::{DeltaResolver, ResolveStats};
pub use sideband::{extract_pack, locate_pack};
pub use tree::{assemble_tree, encode_tree, parse_tree_entries, TreeEntry};

/// Result type for git protocol operations.
pub type Result<T> = std::result::Result<T, GitError>;
