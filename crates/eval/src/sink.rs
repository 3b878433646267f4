//! Byte-quota enforcing output buffer.
//!
//! Writes are measured in the configured encoding. When a write would cross
//! the quota, only the longest character prefix whose encoded form fits is
//! written, so output never ends in a partial multi-byte sequence.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Encoding {
    #[default]
    #[serde(rename = "utf-8", alias = "utf8")]
    Utf8,
    #[serde(rename = "utf-16le")]
    Utf16Le,
    #[serde(rename = "utf-16be")]
    Utf16Be,
    /// ISO-8859-1; characters above U+00FF are written as `?`.
    #[serde(rename = "latin1", alias = "iso-8859-1")]
    Latin1,
}

impl Encoding {
    pub fn char_len(self, c: char) -> usize {
        match self {
            Encoding::Utf8 => c.len_utf8(),
            Encoding::Utf16Le | Encoding::Utf16Be => c.len_utf16() * 2,
            Encoding::Latin1 => 1,
        }
    }

    pub fn encoded_len(self, text: &str) -> usize {
        match self {
            Encoding::Utf8 => text.len(),
            Encoding::Latin1 => text.chars().count(),
            Encoding::Utf16Le | Encoding::Utf16Be => text.encode_utf16().count() * 2,
        }
    }

    pub fn encode_into(self, text: &str, out: &mut Vec<u8>) {
        match self {
            Encoding::Utf8 => out.extend_from_slice(text.as_bytes()),
            Encoding::Utf16Le => text
                .encode_utf16()
                .for_each(|u| out.extend_from_slice(&u.to_le_bytes())),
            Encoding::Utf16Be => text
                .encode_utf16()
                .for_each(|u| out.extend_from_slice(&u.to_be_bytes())),
            Encoding::Latin1 => out.extend(
                text.chars()
                    .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?')),
            ),
        }
    }

    pub fn decode(self, bytes: &[u8]) -> String {
        match self {
            Encoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Encoding::Utf16Le => {
                let units: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|p| u16::from_le_bytes([p[0], p[1]]))
                    .collect();
                String::from_utf16_lossy(&units)
            }
            Encoding::Utf16Be => {
                let units: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|p| u16::from_be_bytes([p[0], p[1]]))
                    .collect();
                String::from_utf16_lossy(&units)
            }
            Encoding::Latin1 => bytes.iter().map(|&b| char::from(b)).collect(),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Encoding::Utf8 => "utf-8",
            Encoding::Utf16Le => "utf-16le",
            Encoding::Utf16Be => "utf-16be",
            Encoding::Latin1 => "latin1",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for Encoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(Encoding::Utf8),
            "utf-16le" | "utf16le" | "utf-16" => Ok(Encoding::Utf16Le),
            "utf-16be" | "utf16be" => Ok(Encoding::Utf16Be),
            "latin1" | "iso-8859-1" => Ok(Encoding::Latin1),
            other => Err(format!("unsupported encoding '{}'", other)),
        }
    }
}

#[derive(Debug)]
pub struct OutputSink {
    buffer: Vec<u8>,
    encoding: Encoding,
    /// 0 means unlimited.
    max_size: usize,
    written: usize,
    reached_limit: bool,
    truncated: bool,
}

impl OutputSink {
    pub fn new(encoding: Encoding, max_size: usize) -> Self {
        OutputSink {
            buffer: Vec::new(),
            encoding,
            max_size,
            written: 0,
            reached_limit: false,
            truncated: false,
        }
    }

    pub fn write(&mut self, text: &str) {
        let len = self.encoding.encoded_len(text);
        self.write_sized(text, len);
    }

    /// Write `text` whose encoded length the caller already knows.
    pub fn write_sized(&mut self, text: &str, encoded_len: usize) {
        if text.is_empty() {
            return;
        }
        if self.max_size == 0 {
            self.append(text, encoded_len);
            return;
        }
        if self.reached_limit || self.written >= self.max_size {
            self.reached_limit = true;
            self.truncated = true;
            return;
        }
        let remaining = self.max_size - self.written;
        if encoded_len <= remaining {
            self.append(text, encoded_len);
            return;
        }

        let mut fits = 0usize;
        let mut end = 0usize;
        for (i, c) in text.char_indices() {
            let len = self.encoding.char_len(c);
            if fits + len > remaining {
                break;
            }
            fits += len;
            end = i + c.len_utf8();
        }
        self.truncated = true;
        self.append(&text[..end], fits);
    }

    fn append(&mut self, text: &str, encoded_len: usize) {
        self.encoding.encode_into(text, &mut self.buffer);
        self.written += encoded_len;
    }

    pub fn bytes_written(&self) -> usize {
        self.written
    }

    /// Set once a write found the quota already used up.
    pub fn reached_limit(&self) -> bool {
        self.reached_limit
    }

    /// Some text handed to the sink was dropped.
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    /// True when no further byte can be written.
    pub fn is_exhausted(&self) -> bool {
        self.reached_limit || (self.max_size != 0 && self.written >= self.max_size)
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlimited_sink_writes_everything() {
        let mut sink = OutputSink::new(Encoding::Utf8, 0);
        sink.write("hello ");
        sink.write("world");
        assert!(!sink.is_exhausted());
        assert_eq!(sink.into_bytes(), b"hello world");
    }

    #[test]
    fn truncates_at_exact_byte_limit() {
        let mut sink = OutputSink::new(Encoding::Utf8, 8);
        sink.write("hello ");
        sink.write("world");
        assert_eq!(sink.bytes_written(), 8);
        assert!(sink.is_exhausted());
        assert!(!sink.reached_limit());
        assert!(sink.truncated());
        sink.write("!");
        assert!(sink.reached_limit());
        assert_eq!(sink.into_bytes(), b"hello wo");
    }

    #[test]
    fn truncation_never_splits_multibyte_chars() {
        // 'é' is 2 bytes in UTF-8, so only "aé" (3 bytes) fits in 4
        let mut sink = OutputSink::new(Encoding::Utf8, 4);
        sink.write("aéé");
        assert_eq!(sink.bytes_written(), 3);
        let bytes = sink.into_bytes();
        assert_eq!(String::from_utf8(bytes).unwrap(), "aé");
    }

    #[test]
    fn leftover_budget_is_still_usable_by_next_write() {
        let mut sink = OutputSink::new(Encoding::Utf8, 4);
        sink.write("aéé");
        sink.write("zz");
        assert_eq!(sink.bytes_written(), 4);
        assert_eq!(String::from_utf8(sink.into_bytes()).unwrap(), "aéz");
    }

    #[test]
    fn utf16_counts_code_units() {
        let mut sink = OutputSink::new(Encoding::Utf16Le, 5);
        sink.write("abc");
        assert_eq!(sink.bytes_written(), 4);
        let bytes = sink.into_bytes();
        assert_eq!(Encoding::Utf16Le.decode(&bytes), "ab");
    }

    #[test]
    fn utf16_surrogate_pairs_are_not_split() {
        let mut sink = OutputSink::new(Encoding::Utf16Be, 4);
        sink.write("a😀");
        assert_eq!(sink.bytes_written(), 2);
        assert_eq!(Encoding::Utf16Be.decode(&sink.into_bytes()), "a");
    }

    #[test]
    fn latin1_replaces_unmappable_chars() {
        let mut sink = OutputSink::new(Encoding::Latin1, 0);
        sink.write("é€");
        assert_eq!(sink.into_bytes(), vec![0xE9, b'?']);
    }

    #[test]
    fn parses_encoding_names() {
        assert_eq!("UTF-8".parse::<Encoding>(), Ok(Encoding::Utf8));
        assert_eq!("utf-16be".parse::<Encoding>(), Ok(Encoding::Utf16Be));
        assert!("ebcdic".parse::<Encoding>().is_err());
    }
}
