// SPDX-License-Identifier: MIT OR Apache-2.0
//! Incremental lossy UTF-8 decoding for piped output.
//!
//! Pipes deliver bytes in arbitrary chunk boundaries, so a multi-byte
//! codepoint can arrive split across two reads. [`Utf8StreamDecoder`]
//! carries the incomplete trailing sequence of each chunk into the next
//! one, so the concatenation of all decoded chunks equals the lossy decode
//! of the whole stream no matter how it was sliced. Invalid sequences are
//! replaced with U+FFFD, one replacement per maximal invalid subpart.

/// Streaming UTF-8 decoder with replace-on-error policy.
///
/// One instance per pipe; feed chunks in read order with
/// [`decode_chunk`](Self::decode_chunk) and flush the trailing carry with
/// [`finish`](Self::finish) once the pipe is exhausted.
#[derive(Debug, Default)]
pub struct Utf8StreamDecoder {
    carry: Vec<u8>,
}

impl Utf8StreamDecoder {
    /// Fresh decoder with no carried bytes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the next chunk of bytes.
    ///
    /// An incomplete multi-byte sequence at the end of the chunk is held
    /// back (at most 3 bytes) and prepended to the next chunk.
    pub fn decode_chunk(&mut self, chunk: &[u8]) -> String {
        let mut pending = std::mem::take(&mut self.carry);
        let bytes: &[u8] = if pending.is_empty() {
            chunk
        } else {
            pending.extend_from_slice(chunk);
            &pending
        };

        let mut out = String::with_capacity(bytes.len());
        let mut rest = bytes;
        loop {
            match std::str::from_utf8(rest) {
                Ok(s) => {
                    out.push_str(s);
                    break;
                }
                Err(err) => {
                    let valid_len = err.valid_up_to();
                    // Borrowed Cow: the prefix is known valid.
                    out.push_str(&String::from_utf8_lossy(&rest[..valid_len]));
                    match err.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &rest[valid_len + bad..];
                        }
                        None => {
                            // Truncated sequence at the chunk boundary.
                            self.carry = rest[valid_len..].to_vec();
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    /// Flush carried bytes once the stream has ended.
    ///
    /// A sequence still incomplete at end-of-stream decodes to a single
    /// replacement character, matching whole-input lossy decoding.
    pub fn finish(&mut self) -> String {
        if self.carry.is_empty() {
            return String::new();
        }
        let carried = std::mem::take(&mut self.carry);
        String::from_utf8_lossy(&carried).into_owned()
    }

    /// `true` while bytes are held over from the previous chunk.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.carry.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
