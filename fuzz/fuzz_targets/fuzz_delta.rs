//! Fuzz target for delta application.
//!
//! The first byte picks how much of the input is the base; the rest is
//! the instruction stream.

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&split, rest)) = data.split_first() else {
        return;
    };
    let (base, stream) = rest.split_at(usize::from(split).min(rest.len()));
    let _ = packrat_git::apply_delta(base, stream);
});
