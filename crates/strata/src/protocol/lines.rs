//! UTF-8 safe line accumulation across arbitrary read boundaries

/// Accumulates raw bytes and yields complete lines.
///
/// Bytes of a multi-byte character split across reads are held back until the
/// rest arrives. Invalid sequences become U+FFFD.
#[derive(Debug, Default)]
pub struct LineSplitter {
    tail: String,
    pending: Vec<u8>,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes, returning every line completed by them (without `\n`)
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let text = self.take_decodable();
        self.push_str(&text)
    }

    /// Feed already-decoded text
    pub fn push_str(&mut self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }
        self.tail.push_str(text);

        let mut parts: Vec<String> = self.tail.split('\n').map(str::to_string).collect();
        // The last element is always the unfinished line, possibly empty
        self.tail = parts.pop().unwrap_or_default();
        parts
    }

    /// Flush whatever is left at end of input
    pub fn finish(&mut self) -> Option<String> {
        if !self.pending.is_empty() {
            let rest = String::from_utf8_lossy(&self.pending).into_owned();
            self.pending.clear();
            self.tail.push_str(&rest);
        }
        let tail = std::mem::take(&mut self.tail);
        (!tail.is_empty()).then_some(tail)
    }

    /// True if a partial line or partial character is buffered
    pub fn has_pending(&self) -> bool {
        !self.tail.is_empty() || !self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.tail.clear();
        self.pending.clear();
    }

    fn take_decodable(&mut self) -> String {
        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(s) => {
                    out.push_str(s);
                    self.pending.clear();
                    return out;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    // valid_up_to guarantees this prefix is UTF-8
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        // Truncated sequence at the end: wait for more bytes
                        None => {
                            self.pending.drain(..valid);
                            return out;
                        }
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + len);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splits_and_retains_tail() {
        let mut lines = LineSplitter::new();
        assert_eq!(lines.push_str("one\ntw"), vec!["one"]);
        assert!(lines.has_pending());
        assert_eq!(lines.push_str("o\n\nthree"), vec!["two", ""]);
        assert_eq!(lines.finish(), Some("three".to_string()));
        assert!(!lines.has_pending());
    }

    #[test]
    fn test_terminator_at_chunk_boundary() {
        let mut lines = LineSplitter::new();
        assert_eq!(lines.push_str("abc"), Vec::<String>::new());
        assert_eq!(lines.push_str("\n"), vec!["abc"]);
        assert_eq!(lines.finish(), None);
    }

    #[test]
    fn test_multibyte_split_is_held_back() {
        let bytes = "é✓\n".as_bytes();
        let mut lines = LineSplitter::new();
        let mut out = Vec::new();
        for b in bytes {
            out.extend(lines.push_bytes(std::slice::from_ref(b)));
        }
        assert_eq!(out, vec!["é✓"]);
    }

    #[test]
    fn test_invalid_bytes_become_replacement() {
        let mut lines = LineSplitter::new();
        let out = lines.push_bytes(b"a\xFFb\n");
        assert_eq!(out, vec!["a\u{FFFD}b"]);
    }

    #[test]
    fn test_truncated_sequence_flushed_on_finish() {
        let mut lines = LineSplitter::new();
        assert!(lines.push_bytes(&[b'x', 0xE2, 0x9C]).is_empty());
        assert_eq!(lines.finish(), Some("x\u{FFFD}".to_string()));
    }

    #[test]
    fn test_clear() {
        let mut lines = LineSplitter::new();
        lines.push_bytes(&[b'x', 0xE2]);
        lines.clear();
        assert!(!lines.has_pending());
        assert_eq!(lines.finish(), None);
    }
}
