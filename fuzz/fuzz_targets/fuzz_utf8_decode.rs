// SPDX-License-Identifier: MIT OR Apache-2.0
//! Fuzz the incremental UTF-8 decoder against arbitrary chunk slicing.
//!
//! Verifies:
//! 1. Decoding never panics for any byte stream and any chunking.
//! 2. The concatenation of all chunk decodes plus the final flush equals
//!    the whole-input lossy decode, regardless of where the cuts fall.
//! 3. finish() drains the carry completely.
#![no_main]
use libfuzzer_sys::fuzz_target;
use runlet_core::Utf8StreamDecoder;

fuzz_target!(|input: (Vec<u8>, Vec<u8>)| {
    let (bytes, cuts) = input;

    let mut decoder = Utf8StreamDecoder::new();
    let mut decoded = String::new();

    // Slice the stream at fuzzer-chosen positions; a zero cut produces an
    // empty chunk, which must also be harmless.
    let mut rest: &[u8] = &bytes;
    for cut in cuts {
        let take = (cut as usize).min(rest.len());
        let (chunk, tail) = rest.split_at(take);
        decoded.push_str(&decoder.decode_chunk(chunk));
        rest = tail;
    }
    decoded.push_str(&decoder.decode_chunk(rest));
    decoded.push_str(&decoder.finish());

    // --- Property 1: chunked decode equals whole-input decode ---
    let expected = String::from_utf8_lossy(&bytes);
    assert_eq!(decoded, expected, "chunking must not change the decode");

    // --- Property 2: finish leaves nothing pending ---
    assert!(!decoder.has_pending());
    assert_eq!(decoder.finish(), "");
});
