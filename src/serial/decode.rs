use crate::error::ReadError;

/// Incremental UTF-8 decoder for a byte stream that arrives in arbitrary chunks.
///
/// A multi-byte sequence cut at a chunk boundary is held back until the rest
/// arrives; bytes that can never form valid UTF-8 are an error.
#[derive(Debug, Default)]
pub struct ChunkDecoder {
    pending: Vec<u8>,
}

impl ChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, chunk: &[u8]) -> Result<String, ReadError> {
        self.pending.extend_from_slice(chunk);

        match std::str::from_utf8(&self.pending) {
            Ok(text) => {
                let text = text.to_string();
                self.pending.clear();
                Ok(text)
            }
            Err(err) if err.error_len().is_none() => {
                let valid = err.valid_up_to();
                let tail = self.pending.split_off(valid);
                let text = String::from_utf8(std::mem::replace(&mut self.pending, tail))
                    .map_err(|err| ReadError::Decode(err.utf8_error()))?;
                Ok(text)
            }
            Err(err) => {
                self.pending.clear();
                Err(ReadError::Decode(err))
            }
        }
    }
}

/// Longest run of text held back while waiting for a newline.
const MAX_PENDING_LINE: usize = 1024;

/// Reassembles newline-terminated messages from decoded text.
///
/// Everything after the last `\n` stays buffered until a later chunk
/// completes it, so a report split across two reads arrives whole.
#[derive(Debug, Default)]
pub struct LineFramer {
    pending: String,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `text` and return the complete lines it finished, newlines
    /// included. A run longer than `MAX_PENDING_LINE` without any newline is
    /// released as is.
    pub fn push(&mut self, text: &str) -> Option<String> {
        self.pending.push_str(text);

        match self.pending.rfind('\n') {
            Some(end) => {
                let rest = self.pending.split_off(end + 1);
                Some(std::mem::replace(&mut self.pending, rest))
            }
            None if self.pending.len() > MAX_PENDING_LINE => {
                Some(std::mem::take(&mut self.pending))
            }
            None => None,
        }
    }

    /// Text received since the last newline.
    pub fn pending(&self) -> &str {
        &self.pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_ascii_chunks() {
        let mut decoder = ChunkDecoder::new();
        assert_eq!(decoder.decode(b"RGB:1,2,3\n").unwrap(), "RGB:1,2,3\n");
    }

    #[test]
    fn holds_back_split_multibyte_sequence() {
        let mut decoder = ChunkDecoder::new();
        let arrow = "→".as_bytes();
        assert_eq!(decoder.decode(&[b'a', arrow[0]]).unwrap(), "a");
        assert_eq!(decoder.decode(&arrow[1..]).unwrap(), "→");
    }

    #[test]
    fn rejects_invalid_bytes() {
        let mut decoder = ChunkDecoder::new();
        assert!(matches!(
            decoder.decode(&[b'o', b'k', 0xFF, b'!']),
            Err(ReadError::Decode(_))
        ));
        // The decoder recovers for the next chunk.
        assert_eq!(decoder.decode(b"fine").unwrap(), "fine");
    }

    #[test]
    fn framer_joins_report_split_across_reads() {
        let mut framer = LineFramer::new();
        assert_eq!(framer.push("RGB:25"), None);
        assert_eq!(framer.pending(), "RGB:25");
        assert_eq!(framer.push("5,0,0\n").as_deref(), Some("RGB:255,0,0\n"));
        assert_eq!(framer.pending(), "");
    }

    #[test]
    fn framer_keeps_tail_after_last_newline() {
        let mut framer = LineFramer::new();
        assert_eq!(
            framer.push("RGB:1,2,3\nRGB:4,5,6\nRGB:7").as_deref(),
            Some("RGB:1,2,3\nRGB:4,5,6\n")
        );
        assert_eq!(framer.pending(), "RGB:7");
        assert_eq!(framer.push(",8,9\n").as_deref(), Some("RGB:7,8,9\n"));
    }

    #[test]
    fn framer_releases_overlong_unterminated_run() {
        let mut framer = LineFramer::new();
        let noise = "x".repeat(MAX_PENDING_LINE);
        assert_eq!(framer.push(&noise), None);
        assert_eq!(framer.push("y").map(|text| text.len()), Some(MAX_PENDING_LINE + 1));
        assert_eq!(framer.pending(), "");
    }
}
