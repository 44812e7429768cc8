//! Decoder for the compressor's progress output.
//!
//! With `-bsp1` the compressor redraws a single status line using carriage
//! returns and backspaces, e.g. ` 42% 1 + mail.pst`. The decoder splits on
//! `\n`, `\r` and backspace and yields each new percentage once.

use bytes::BytesMut;
use regex::Regex;
use std::sync::OnceLock;
use tokio_util::codec::Decoder;

/// Longest status line kept while waiting for a separator
const MAX_LINE: usize = 4096;

fn percent_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(\d+)%").expect("valid percent pattern"))
}

fn is_separator(b: u8) -> bool {
    matches!(b, b'\n' | b'\r' | 0x08)
}

/// Percentage found in one status line, clamped to 100
pub fn parse_percent(line: &str) -> Option<u8> {
    let caps = percent_pattern().captures(line)?;
    let value = caps[1].parse::<u32>().unwrap_or(u32::MAX);
    Some(value.min(100) as u8)
}

/// Turns raw stdout bytes into a non-decreasing sequence of percentages.
#[derive(Debug, Default)]
pub struct ProgressDecoder {
    last: Option<u8>,
}

impl ProgressDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value to emit for `line`, if it carries a new percentage
    fn accept(&mut self, line: &[u8]) -> Option<u8> {
        let percent = parse_percent(&String::from_utf8_lossy(line))?;
        match self.last {
            Some(last) if percent <= last => None,
            _ => {
                self.last = Some(percent);
                Some(percent)
            }
        }
    }
}

impl Decoder for ProgressDecoder {
    type Item = u8;
    type Error = std::io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<u8>, Self::Error> {
        while let Some(pos) = buf.iter().position(|b| is_separator(*b)) {
            let line = buf.split_to(pos + 1);
            if let Some(percent) = self.accept(&line[..pos]) {
                return Ok(Some(percent));
            }
        }

        if buf.len() > MAX_LINE {
            buf.clear();
        }
        Ok(None)
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<u8>, Self::Error> {
        if let Some(percent) = self.decode(buf)? {
            return Ok(Some(percent));
        }
        if buf.is_empty() {
            return Ok(None);
        }
        let line = buf.split();
        Ok(self.accept(&line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use tokio_util::codec::FramedRead;

    fn decode_all(input: &[u8]) -> Vec<u8> {
        let mut decoder = ProgressDecoder::new();
        let mut buf = BytesMut::from(input);
        let mut out = Vec::new();
        while let Some(p) = decoder.decode(&mut buf).unwrap() {
            out.push(p);
        }
        while let Some(p) = decoder.decode_eof(&mut buf).unwrap() {
            out.push(p);
        }
        out
    }

    #[test]
    fn test_parse_percent() {
        assert_eq!(parse_percent(" 42% 1 + mail.pst"), Some(42));
        assert_eq!(parse_percent("100%"), Some(100));
        assert_eq!(parse_percent("250%"), Some(100));
        assert_eq!(parse_percent("Scanning the drive"), None);
    }

    #[test]
    fn test_carriage_return_and_backspace_separators() {
        let out = decode_all(b"  0%\r 12%\x08\x08\x08\x08 57%\r\n100%\n");
        assert_eq!(out, vec![0, 12, 57, 100]);
    }

    #[test]
    fn test_progress_never_decreases() {
        let out = decode_all(b"10%\r30%\r20%\r30%\r90%\n");
        assert_eq!(out, vec![10, 30, 90]);
    }

    #[test]
    fn test_trailing_line_without_separator() {
        let out = decode_all(b"7-Zip (a) 19.00\n\n 99%\r100%");
        assert_eq!(out, vec![99, 100]);
    }

    #[test]
    fn test_runaway_line_is_dropped() {
        let mut decoder = ProgressDecoder::new();
        let mut buf = BytesMut::from(vec![b'x'; MAX_LINE + 1].as_slice());
        assert_eq!(decoder.decode(&mut buf).unwrap(), None);
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn test_framed_read_over_reader() {
        let input: &[u8] = b"  0%\r 50%\r100%\nEverything is Ok\n";
        let values: Vec<u8> = FramedRead::new(input, ProgressDecoder::new())
            .filter_map(|r| async move { r.ok() })
            .collect()
            .await;
        assert_eq!(values, vec![0, 50, 100]);
    }
}
