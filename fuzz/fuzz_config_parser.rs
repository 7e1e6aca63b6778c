//! Fuzz target for the TOML configuration parser.
//!
//! Run with: cargo +nightly fuzz run fuzz_config_parser
//!
//! Feeds arbitrary UTF-8 to `AppConfig::parse()`, covering TOML
//! deserialization and the endpoint/retry/monitor validation rules.

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(config) = kastatus_config::AppConfig::parse(s) {
            // Anything that parses must also pass validation on its own.
            assert!(config.validate().is_ok());
        }
    }
});
