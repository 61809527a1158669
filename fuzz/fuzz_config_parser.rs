//! Fuzz target for the TOML configuration parser.
//!
//! Run with: cargo +nightly fuzz run fuzz_config_parser
//!
//! Feeds arbitrary text to `AppConfig::parse()`, covering TOML decoding and
//! the search limit validation.

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(config) = aide_config::AppConfig::parse(s) {
            // Accepted configs must yield usable search settings.
            let _ = config.search.resolved_roots();
            let _ = config.search.snapshot_skip_bytes();
        }
    }
});
