//! Fuzz target for tree parsing and registry linking.

#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use packrat_storage::ObjectRegistry;

fuzz_target!(|data: &[u8]| {
    let _ = packrat_git::parse_tree_entries(data);

    let mut registry = ObjectRegistry::new();
    let _ = packrat_git::assemble_tree(&mut registry, Bytes::copy_from_slice(data));
});
