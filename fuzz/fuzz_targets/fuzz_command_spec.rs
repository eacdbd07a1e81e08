// SPDX-License-Identifier: MIT OR Apache-2.0
//! Fuzz command-specification parsing.
//!
//! Verifies:
//! 1. Resolving an arbitrary shell line to argv never panics.
//! 2. Deserializing arbitrary JSON as CommandSpec never panics, and any
//!    accepted spec survives a serde round trip.
//! 3. display_line is total and resolved argv is never empty.
#![no_main]
use libfuzzer_sys::fuzz_target;
use runlet_core::{CommandSpec, ErrorCode};

fuzz_target!(|data: &[u8]| {
    let s = match std::str::from_utf8(data) {
        Ok(s) => s,
        Err(_) => return,
    };

    // --- Property 1: shell-line resolution never panics ---
    let spec = CommandSpec::line(s);
    let _ = spec.display_line();
    match spec.to_argv() {
        Ok(argv) => assert!(!argv.is_empty(), "resolved argv must never be empty"),
        Err(err) => assert_eq!(err.code, ErrorCode::InvalidCommand),
    }

    // --- Property 2: JSON deserialization never panics ---
    if let Ok(parsed) = serde_json::from_str::<CommandSpec>(s) {
        let _ = parsed.display_line();
        let _ = parsed.to_argv();

        let json = serde_json::to_string(&parsed).expect("accepted spec must serialize");
        let rt: CommandSpec =
            serde_json::from_str(&json).expect("CommandSpec round-trip must succeed");
        assert_eq!(rt, parsed);
    }

    // --- Property 3: argv form resolves verbatim ---
    let tokens: Vec<String> = s.split_whitespace().map(str::to_string).collect();
    let argv_spec = CommandSpec::argv(tokens.clone());
    match argv_spec.to_argv() {
        Ok(argv) => assert_eq!(argv, tokens),
        Err(_) => assert!(tokens.is_empty()),
    }
});
