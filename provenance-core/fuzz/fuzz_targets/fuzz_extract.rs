#![no_main]

//! Fuzz target for watermark extraction
//!
//! Decodes arbitrary bytes as an image and extracts from whatever decodes.
//! Confidence must stay within [0.5, 1] once any block voted.
//!
//! Run with: cargo +nightly fuzz run fuzz_extract

use libfuzzer_sys::fuzz_target;
use provenance_core::{MediaAsset, WatermarkCodec, WatermarkConfig};

fuzz_target!(|data: &[u8]| {
    let Ok(image) = MediaAsset::from_encoded(data) else {
        return;
    };
    // Keep decompression bombs out of the corpus
    if u64::from(image.width()) * u64::from(image.height()) > 4_000_000 {
        return;
    }

    let codec = WatermarkCodec::new(WatermarkConfig::default()).expect("default config is valid");
    let result = codec.extract(&image);
    assert_eq!(result.bits.len(), codec.config().payload_bits as usize);
    if result.blocks_used > 0 {
        assert!((0.5..=1.0).contains(&result.confidence));
    }
});
