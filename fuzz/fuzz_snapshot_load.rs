//! Fuzz target for index snapshot decoding.
//!
//! Run with: cargo +nightly fuzz run fuzz_snapshot_load
//!
//! Snapshots are read back from disk on every daemon start, so a truncated
//! or hand-edited file must be rejected, never panic. Decoded indexes are
//! queried once to check that their postings are consistent.

#![no_main]

use aide_core::search::{SearchOptions, decode_snapshot};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(index) = decode_snapshot(data) {
        let options = SearchOptions {
            limit: Some(5),
            prefix: true,
        };
        let _ = index.search("a", &options);
        let _ = index.stats();
    }
});
