//! Incremental UTF-8 line decoding of child process output.

use crate::search::SearchError;

const REPLACEMENT: &str = "\u{FFFD}";

/// Reassembles lines from arbitrarily split stdout chunks.
///
/// Incomplete multi-byte sequences at the end of a chunk are carried into the
/// next call, and the text after the last line break is held back until its
/// terminator arrives or the stream ends.
#[derive(Debug, Default)]
pub struct LineDecoder {
    /// Undecoded bytes of a multi-byte sequence split by a chunk boundary.
    carry: Vec<u8>,
    /// Decoded text not yet terminated by `\n`.
    pending: String,
}

impl LineDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return every line it completes.
    ///
    /// # Errors
    ///
    /// Returns `SearchError::MalformedStream` if a produced line still holds a
    /// line break.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>, SearchError> {
        self.carry.extend_from_slice(chunk);
        self.decode_carry(false);
        self.split_pending()
    }

    /// Emit what can be emitted without more input.
    ///
    /// With `is_final`, any carried bytes are decoded lossily and the trailing
    /// fragment is emitted as a last line unless it is blank.
    ///
    /// # Errors
    ///
    /// Returns `SearchError::MalformedStream` if a produced line still holds a
    /// line break.
    pub fn flush(&mut self, is_final: bool) -> Result<Vec<String>, SearchError> {
        self.decode_carry(is_final);
        let mut lines = self.split_pending()?;
        if is_final {
            let rest = std::mem::take(&mut self.pending);
            let rest = rest.trim_end();
            if !rest.is_empty() {
                lines.push(checked(rest.to_string())?);
            }
        }
        Ok(lines)
    }

    /// Bytes and text currently held back.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.carry.len() + self.pending.len()
    }

    fn decode_carry(&mut self, is_final: bool) {
        let mut start = 0;
        loop {
            match std::str::from_utf8(&self.carry[start..]) {
                Ok(text) => {
                    self.pending.push_str(text);
                    start = self.carry.len();
                    break;
                }
                Err(err) => {
                    let valid = start + err.valid_up_to();
                    self.pending
                        .push_str(&String::from_utf8_lossy(&self.carry[start..valid]));
                    match err.error_len() {
                        Some(len) => {
                            self.pending.push_str(REPLACEMENT);
                            start = valid + len;
                        }
                        None if is_final => {
                            self.pending.push_str(REPLACEMENT);
                            start = self.carry.len();
                            break;
                        }
                        None => {
                            start = valid;
                            break;
                        }
                    }
                }
            }
        }
        self.carry.drain(..start);
    }

    fn split_pending(&mut self) -> Result<Vec<String>, SearchError> {
        let Some(last_break) = self.pending.rfind('\n') else {
            return Ok(Vec::new());
        };
        let rest = self.pending.split_off(last_break + 1);
        let complete = std::mem::replace(&mut self.pending, rest);

        complete
            .split_terminator('\n')
            .map(|line| checked(line.strip_suffix('\r').unwrap_or(line).to_string()))
            .collect()
    }
}

fn checked(line: String) -> Result<String, SearchError> {
    if line.contains('\n') {
        return Err(SearchError::MalformedStream(format!(
            "line contains a line break: {line:?}"
        )));
    }
    Ok(line)
}
