// SPDX-License-Identifier: MIT OR Apache-2.0
//! Output events emitted by a single process execution.
//!
//! An execution yields a finite sequence of [`OutputEvent`]s: zero or more
//! `stdout`/`stderr` text events followed by exactly one terminal
//! `return_code` event. Per-stream ordering is preserved; interleaving
//! between the two streams is best-effort. A negative return code is
//! reserved for engine-internal failures and never collides with a child
//! exit status.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// StreamSource
// ---------------------------------------------------------------------------

/// Which child pipe a piece of output was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamSource {
    /// The child's standard output.
    Stdout,
    /// The child's standard error.
    Stderr,
}

impl fmt::Display for StreamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        })
    }
}

// ---------------------------------------------------------------------------
// OutputEvent
// ---------------------------------------------------------------------------

/// A single unit of the engine's output contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum OutputEvent {
    /// Decoded text read from the child's standard output.
    Stdout {
        /// The decoded chunk, replacement characters substituted for
        /// undecodable bytes.
        text: String,
    },
    /// Decoded text read from the child's standard error.
    Stderr {
        /// The decoded chunk.
        text: String,
    },
    /// Terminal event carrying the run's result code. Emitted exactly once,
    /// strictly last.
    ReturnCode {
        /// Child exit status, `128 + signo` for signal deaths, or a
        /// reserved negative engine code.
        code: i32,
    },
}

impl OutputEvent {
    /// Construct a `stdout` text event.
    pub fn stdout(text: impl Into<String>) -> Self {
        Self::Stdout { text: text.into() }
    }

    /// Construct a `stderr` text event.
    pub fn stderr(text: impl Into<String>) -> Self {
        Self::Stderr { text: text.into() }
    }

    /// Construct the terminal `return_code` event.
    #[must_use]
    pub fn return_code(code: i32) -> Self {
        Self::ReturnCode { code }
    }

    /// Build a text event for the given stream.
    pub fn for_stream(source: StreamSource, text: impl Into<String>) -> Self {
        match source {
            StreamSource::Stdout => Self::stdout(text),
            StreamSource::Stderr => Self::stderr(text),
        }
    }

    /// `true` for the terminal `return_code` event.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ReturnCode { .. })
    }

    /// The stream this event belongs to, `None` for the terminal event.
    #[must_use]
    pub fn source(&self) -> Option<StreamSource> {
        match self {
            Self::Stdout { .. } => Some(StreamSource::Stdout),
            Self::Stderr { .. } => Some(StreamSource::Stderr),
            Self::ReturnCode { .. } => None,
        }
    }

    /// The carried text, `None` for the terminal event.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Stdout { text } | Self::Stderr { text } => Some(text),
            Self::ReturnCode { .. } => None,
        }
    }

    /// The serde tag name of this event (`"stdout"`, `"stderr"`,
    /// `"return_code"`).
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Stdout { .. } => "stdout",
            Self::Stderr { .. } => "stderr",
            Self::ReturnCode { .. } => "return_code",
        }
    }
}

// ---------------------------------------------------------------------------
// EventLog
// ---------------------------------------------------------------------------

/// An owned, ordered collection of [`OutputEvent`]s with query helpers.
///
/// Used by callers that want the whole run at once (summaries, tests)
/// rather than the live stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLog {
    events: Vec<OutputEvent>,
}

impl EventLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event.
    pub fn push(&mut self, event: OutputEvent) {
        self.events.push(event);
    }

    /// All events in arrival order.
    #[must_use]
    pub fn events(&self) -> &[OutputEvent] {
        &self.events
    }

    /// Concatenated text of all `stdout` events.
    #[must_use]
    pub fn stdout_text(&self) -> String {
        self.text_of(StreamSource::Stdout)
    }

    /// Concatenated text of all `stderr` events.
    #[must_use]
    pub fn stderr_text(&self) -> String {
        self.text_of(StreamSource::Stderr)
    }

    fn text_of(&self, source: StreamSource) -> String {
        self.events
            .iter()
            .filter(|e| e.source() == Some(source))
            .filter_map(OutputEvent::text)
            .collect()
    }

    /// The terminal return code, if the log contains one.
    #[must_use]
    pub fn return_code(&self) -> Option<i32> {
        self.events.iter().rev().find_map(|e| match e {
            OutputEvent::ReturnCode { code } => Some(*code),
            _ => None,
        })
    }

    /// `true` once a terminal event has been recorded.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.return_code().is_some()
    }

    /// Event counts grouped by kind name.
    #[must_use]
    pub fn counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for e in &self.events {
            *counts.entry(e.kind_name()).or_insert(0) += 1;
        }
        counts
    }

    /// Returns `true` if the log contains no events.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Iterate over events by reference.
    pub fn iter(&self) -> std::slice::Iter<'_, OutputEvent> {
        self.events.iter()
    }
}

impl FromIterator<OutputEvent> for EventLog {
    fn from_iter<I: IntoIterator<Item = OutputEvent>>(iter: I) -> Self {
        Self {
            events: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for EventLog {
    type Item = OutputEvent;
    type IntoIter = std::vec::IntoIter<OutputEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.into_iter()
    }
}

impl<'a> IntoIterator for &'a EventLog {
    type Item = &'a OutputEvent;
    type IntoIter = std::slice::Iter<'a, OutputEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
