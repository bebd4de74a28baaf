//! Fuzz target for pack decoding and delta resolution.
//!
//! Decodes arbitrary bytes as a pack stream and resolves whatever deltas
//! it produced; neither step may panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use packrat_git::{decode_pack, DeltaResolver};

fuzz_target!(|data: &[u8]| {
    if let Ok(mut state) = decode_pack(data) {
        let _ = DeltaResolver::resolve_all(&mut state);
        let _ = state.root_tree();
    }
});
