// SPDX-License-Identifier: MIT OR Apache-2.0
//! Fuzz ErrorCode deserialization, display, and EngineError construction.
//!
//! Verifies:
//! 1. Deserializing arbitrary strings as ErrorCode never panics.
//! 2. All variants keep Display/as_str/category/exit_code consistent.
//! 3. EngineError construction with arbitrary message and context never
//!    panics and always renders.
//! 4. EngineErrorDto round-trips through JSON.
#![no_main]
use libfuzzer_sys::fuzz_target;
use runlet_core::{EngineError, EngineErrorDto, ErrorCode};

/// All known ErrorCode variants for exercising the catalog.
const ALL_CODES: &[ErrorCode] = &[
    ErrorCode::InvalidCommand,
    ErrorCode::ExecutableNotFound,
    ErrorCode::ManagerNotFound,
    ErrorCode::SpawnFailed,
    ErrorCode::Internal,
];

fuzz_target!(|data: &[u8]| {
    let s = match std::str::from_utf8(data) {
        Ok(s) => s,
        Err(_) => return,
    };

    // --- Property 1: JSON deserialization never panics ---
    if let Ok(code) = serde_json::from_str::<ErrorCode>(s) {
        assert_eq!(format!("{code}"), code.as_str());
        let json = serde_json::to_string(&code).expect("ErrorCode must serialize");
        let rt: ErrorCode =
            serde_json::from_str(&json).expect("ErrorCode round-trip must succeed");
        assert_eq!(code, rt);
    }

    // --- Property 2: the catalog is internally consistent ---
    for &code in ALL_CODES {
        assert_eq!(format!("{code}"), code.as_str());
        assert!(code.exit_code() < 0, "engine codes are reserved negatives");
        let _ = format!("{}", code.category());
    }

    // --- Property 3: arbitrary message and context never panic ---
    let code = ALL_CODES[data.first().copied().unwrap_or(0) as usize % ALL_CODES.len()];
    let err = EngineError::new(code, s).with_context("input", s);
    assert!(!format!("{err}").is_empty());
    assert!(!format!("{err:?}").is_empty());
    assert_eq!(err.exit_code(), code.exit_code());

    // --- Property 4: DTO JSON round-trip ---
    let dto = EngineErrorDto::from(&err);
    let json = serde_json::to_string(&dto).expect("EngineErrorDto must serialize");
    let rt: EngineErrorDto =
        serde_json::from_str(&json).expect("EngineErrorDto round-trip must succeed");
    assert_eq!(dto, rt);

    let back: EngineError = rt.into();
    assert_eq!(back.code, code);
});
