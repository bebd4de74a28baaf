//! Fuzz target for pkt-line reading and fetch response demultiplexing.

#![no_main]

use libfuzzer_sys::fuzz_target;
use std::io::Cursor;

fuzz_target!(|data: &[u8]| {
    let mut reader = packrat_git::PktLineReader::new(Cursor::new(data));

    // Bounded so crafted input cannot loop forever
    for _ in 0..100 {
        match reader.read() {
            Ok(Some(_)) => continue,
            Ok(None) | Err(_) => break,
        }
    }

    let _ = packrat_git::parse_ls_refs(data);
    let _ = packrat_git::extract_pack(data);
});
