//! Newline framing for the controller's text stream.

/// Splits decoded text into complete lines, keeping the trailing fragment
/// until its newline arrives.
#[derive(Debug, Default, Clone)]
pub struct LineFramer {
    fragment: String,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk` and return every line it completed, trimmed.
    /// Lines that trim to nothing are dropped.
    pub fn feed(&mut self, chunk: &str) -> Vec<String> {
        self.fragment.push_str(chunk);
        let Some(last_newline) = self.fragment.rfind('\n') else {
            return Vec::new();
        };

        let rest = self.fragment.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.fragment, rest);
        complete
            .split('\n')
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_owned)
            .collect()
    }

    /// The unterminated tail held back from the last `feed`.
    pub fn pending(&self) -> &str {
        &self.fragment
    }

    pub fn clear(&mut self) {
        self.fragment.clear();
    }
}

/// Incremental UTF-8 decoding for byte chunks that may split a code point.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    carry: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode as much of `carry + bytes` as possible. An incomplete sequence
    /// at the end is held for the next call; invalid bytes become U+FFFD.
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.carry.extend_from_slice(bytes);
        let mut out = String::new();
        let mut input: &[u8] = &self.carry;
        loop {
            match std::str::from_utf8(input) {
                Ok(valid) => {
                    out.push_str(valid);
                    input = &[];
                    break;
                }
                Err(e) => {
                    let (valid, after) = input.split_at(e.valid_up_to());
                    out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            input = &after[len..];
                        }
                        None => {
                            input = after;
                            break;
                        }
                    }
                }
            }
        }
        self.carry = input.to_vec();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STREAM: &str = "{\"code\":211}\n\n  {\"motor\":\"Motor1\"}\r\nnoise line\n{\"code\":2";

    #[test]
    fn test_feed_returns_complete_lines_and_keeps_fragment() {
        let mut framer = LineFramer::new();
        let lines = framer.feed(STREAM);
        assert_eq!(lines, vec!["{\"code\":211}", "{\"motor\":\"Motor1\"}", "noise line"]);
        assert_eq!(framer.pending(), "{\"code\":2");

        let lines = framer.feed("12}\n");
        assert_eq!(lines, vec!["{\"code\":212}"]);
        assert_eq!(framer.pending(), "");
    }

    #[test]
    fn test_chunk_boundaries_do_not_change_output() {
        let mut whole = LineFramer::new();
        let expected = whole.feed(STREAM);

        for split in 1..STREAM.len() {
            let mut framer = LineFramer::new();
            let mut lines = framer.feed(&STREAM[..split]);
            lines.extend(framer.feed(&STREAM[split..]));
            assert_eq!(lines, expected, "split at {}", split);
            assert_eq!(framer.pending(), whole.pending());
        }

        let mut framer = LineFramer::new();
        let mut lines = Vec::new();
        for c in STREAM.chars() {
            lines.extend(framer.feed(&c.to_string()));
        }
        assert_eq!(lines, expected);
    }

    #[test]
    fn test_whitespace_only_lines_are_dropped() {
        let mut framer = LineFramer::new();
        assert!(framer.feed(" \n\t\r\n\n").is_empty());
        assert_eq!(framer.pending(), "");
    }

    #[test]
    fn test_decoder_holds_split_code_point() {
        let text = "สถานะ ok\n";
        let bytes = text.as_bytes();
        let mut decoder = Utf8Decoder::new();
        let first = decoder.decode(&bytes[..2]);
        let second = decoder.decode(&bytes[2..]);
        assert_eq!(format!("{}{}", first, second), text);
    }

    #[test]
    fn test_decoder_replaces_invalid_bytes() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.decode(b"a\xffb"), "a\u{fffd}b");
    }
}
