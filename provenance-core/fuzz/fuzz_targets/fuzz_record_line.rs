#![no_main]

//! Fuzz target for LedgerEntry::from_record_line()
//!
//! Any line that parses must re-encode to exactly the same bytes.
//!
//! Run with: cargo +nightly fuzz run fuzz_record_line

use libfuzzer_sys::fuzz_target;
use provenance_core::LedgerEntry;

fuzz_target!(|data: &[u8]| {
    let Ok(line) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(entry) = LedgerEntry::from_record_line(line) {
        let encoded = entry.to_record_line().expect("parsed entry must encode");
        assert_eq!(encoded, line);
    }
});
