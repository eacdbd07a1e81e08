//! Core data model for the runlet process execution engine.
//!
//! Everything here is I/O-free: the command specification accepted by the
//! engine ([`CommandSpec`]), the tagged output contract ([`OutputEvent`]),
//! the run lifecycle state machine ([`PhaseTracker`]), the error taxonomy
//! with its reserved negative exit codes ([`ErrorCode`]), and the
//! incremental UTF-8 decoder ([`Utf8StreamDecoder`]) that turns piped byte
//! chunks into text without splitting codepoints at chunk boundaries.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod decode;
pub mod error;
pub mod event;
pub mod phase;
pub mod platform;
pub mod spec;

pub use decode::Utf8StreamDecoder;
pub use error::{EngineError, EngineErrorDto, ErrorCategory, ErrorCode};
pub use event::{EventLog, OutputEvent, StreamSource};
pub use phase::{PhaseError, PhaseTracker, PhaseTransition, RunPhase};
pub use platform::Platform;
pub use spec::{CommandInput, CommandSpec};
