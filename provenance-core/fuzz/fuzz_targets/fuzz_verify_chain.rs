#![no_main]

//! Fuzz target for ledger verification
//!
//! Treats the input as a newline-delimited record file. Opening and verifying
//! must never panic, whatever the file holds.
//!
//! Run with: cargo +nightly fuzz run fuzz_verify_chain

use libfuzzer_sys::fuzz_target;
use provenance_core::{Ledger, LedgerConfig, LedgerSecret, MemoryStorage};

fuzz_target!(|data: &[u8]| {
    let records: Vec<String> = String::from_utf8_lossy(data)
        .split('\n')
        .map(str::to_string)
        .collect();

    let secret = LedgerSecret::new(b"fuzz-secret".to_vec()).expect("non-empty secret");
    let storage = MemoryStorage::with_records(records);
    let Ok(ledger) = Ledger::open(LedgerConfig::new(secret), Box::new(storage)) else {
        return;
    };
    if let Ok(result) = ledger.verify() {
        assert_eq!(result.valid, result.first_invalid_index.is_none());
    }
});
