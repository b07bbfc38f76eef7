//! The message-block ASCII envelope format used for inbox-style editing of commits and
//! tags: a header block of `Key: Value` lines, a blank line, then a byte-stuffed body,
//! with messages separated by a line of 78 dashes.
//!

use std::io::{self, BufRead, Write};

use crate::containers::OrderedMap;
use crate::error::EnvelopeError;

pub const SEPARATOR_WIDTH: usize = 78;

fn separator_line() -> String {
    "-".repeat(SEPARATOR_WIDTH)
}

/// One parsed message: an ordered header block and a body.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MessageBlock {
    pub headers: OrderedMap,
    pub body: Vec<u8>,
}

impl MessageBlock {
    pub fn new() -> Self {
        MessageBlock::default()
    }

    pub fn get_header(&self, key: &str) -> Option<&str> {
        self.headers.get(key)
    }

    pub fn set_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.headers.set(key, value);
    }

    /// Reads one message from `r`. Returns `Ok(None)` at a clean end of stream (no more
    /// messages), distinguishing it from a genuine parse failure.
    pub fn read(r: &mut impl BufRead) -> Result<Option<MessageBlock>, EnvelopeError> {
        let mut block = MessageBlock::new();
        let mut line = String::new();
        let mut saw_any_line = false;

        // Header block.
        loop {
            line.clear();
            let n = r.read_line(&mut line)?;
            if n == 0 {
                if !saw_any_line {
                    return Ok(None);
                }
                return Err(EnvelopeError::NoHeaderBodySeparator);
            }
            saw_any_line = true;
            let trimmed = line.trim_end_matches(['\n', '\r']);
            if trimmed.is_empty() {
                break;
            }
            if trimmed == separator_line() {
                // Leading separator before the first message: skip it and keep going.
                continue;
            }
            let (key, value) = trimmed
                .split_once(':')
                .ok_or_else(|| EnvelopeError::MalformedHeader(trimmed.as_bytes().to_vec()))?;
            block.headers.set(key.trim(), value.trim());
        }

        // Body, up to (but not including) the next separator line or EOF.
        let mut body = Vec::new();
        loop {
            line.clear();
            let n = r.read_line(&mut line)?;
            if n == 0 {
                break;
            }
            let trimmed = line.trim_end_matches(['\n', '\r']);
            if trimmed == separator_line() {
                break;
            }
            let unstuffed = unstuff_line(trimmed);
            body.extend_from_slice(unstuffed.as_bytes());
            body.push(b'\n');
        }
        if body.ends_with(b"\n") {
            body.pop();
        }
        block.body = body;
        Ok(Some(block))
    }

    /// Writes this message, followed by a separator line, to `w`.
    pub fn write(&self, w: &mut impl Write) -> io::Result<()> {
        for (k, v) in self.headers.iter() {
            writeln!(w, "{k}: {v}")?;
        }
        writeln!(w)?;
        for line in self.body.split(|&b| b == b'\n') {
            let line = String::from_utf8_lossy(line);
            writeln!(w, "{}", stuff_line(&line))?;
        }
        writeln!(w, "{}", separator_line())?;
        Ok(())
    }
}

/// Reads one `K len\nkey\nV len\nval\n...PROPS-END\n` property block (the length-prefixed
/// key/value format some VCS dump tools emit) into an insertion-ordered map. Returns
/// `Ok(None)` at a clean end of stream, same convention as [`MessageBlock::read`].
pub fn read_props(r: &mut impl BufRead) -> Result<Option<OrderedMap>, EnvelopeError> {
    let mut line = String::new();
    if r.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    let mut map = OrderedMap::new();
    loop {
        let trimmed = line.trim_end_matches(['\n', '\r']);
        if trimmed == "PROPS-END" {
            return Ok(Some(map));
        }
        let key = read_length_prefixed(r, trimmed, "K")?;
        line.clear();
        if r.read_line(&mut line)? == 0 {
            return Err(EnvelopeError::MissingHeader("V"));
        }
        let val_header = line.trim_end_matches(['\n', '\r']).to_string();
        let value = read_length_prefixed(r, &val_header, "V")?;
        map.set(key, value);
        line.clear();
        if r.read_line(&mut line)? == 0 {
            return Err(EnvelopeError::MissingHeader("PROPS-END"));
        }
    }
}

fn read_length_prefixed(r: &mut impl BufRead, header: &str, tag: &str) -> Result<String, EnvelopeError> {
    let len: usize = header
        .strip_prefix(tag)
        .and_then(|rest| rest.trim().parse().ok())
        .ok_or_else(|| EnvelopeError::MalformedHeader(header.as_bytes().to_vec()))?;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    let mut newline = [0u8; 1];
    r.read_exact(&mut newline)?;
    String::from_utf8(buf).map_err(|_| EnvelopeError::MalformedHeader(header.as_bytes().to_vec()))
}

fn stuff_line(line: &str) -> String {
    if line.starts_with('.') || line == separator_line() {
        format!(".{line}")
    } else {
        line.to_string()
    }
}

fn unstuff_line(line: &str) -> String {
    if let Some(rest) = line.strip_prefix('.') {
        if rest.starts_with('.') || rest == separator_line() {
            return rest.to_string();
        }
    }
    line.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trips_a_single_message() {
        let mut block = MessageBlock::new();
        block.set_header("Event-Number", "3");
        block.set_header("Branch", "refs/heads/master");
        block.body = b"hello\nworld".to_vec();

        let mut buf = Vec::new();
        block.write(&mut buf).unwrap();

        let mut cursor = Cursor::new(buf);
        let parsed = MessageBlock::read(&mut cursor).unwrap().unwrap();
        assert_eq!(parsed.get_header("Event-Number"), Some("3"));
        assert_eq!(parsed.get_header("Branch"), Some("refs/heads/master"));
        assert_eq!(parsed.body, b"hello\nworld");
    }

    #[test]
    fn byte_stuffs_dot_prefixed_body_lines() {
        let mut block = MessageBlock::new();
        block.body = b".dotfile entry".to_vec();
        let mut buf = Vec::new();
        block.write(&mut buf).unwrap();
        assert!(String::from_utf8_lossy(&buf).contains("\n..dotfile entry\n"));

        let mut cursor = Cursor::new(buf);
        let parsed = MessageBlock::read(&mut cursor).unwrap().unwrap();
        assert_eq!(parsed.body, b".dotfile entry");
    }

    #[test]
    fn byte_stuffs_a_literal_separator_in_the_body() {
        let mut block = MessageBlock::new();
        block.body = separator_line().into_bytes();
        let mut buf = Vec::new();
        block.write(&mut buf).unwrap();

        let mut cursor = Cursor::new(buf);
        let parsed = MessageBlock::read(&mut cursor).unwrap().unwrap();
        assert_eq!(parsed.body, separator_line().as_bytes());
    }

    #[test]
    fn reads_sequential_messages() {
        let mut a = MessageBlock::new();
        a.set_header("Event-Number", "1");
        let mut b = MessageBlock::new();
        b.set_header("Event-Number", "2");

        let mut buf = Vec::new();
        a.write(&mut buf).unwrap();
        b.write(&mut buf).unwrap();

        let mut cursor = Cursor::new(buf);
        let first = MessageBlock::read(&mut cursor).unwrap().unwrap();
        let second = MessageBlock::read(&mut cursor).unwrap().unwrap();
        let third = MessageBlock::read(&mut cursor).unwrap();
        assert_eq!(first.get_header("Event-Number"), Some("1"));
        assert_eq!(second.get_header("Event-Number"), Some("2"));
        assert!(third.is_none());
    }

    #[test]
    fn empty_stream_yields_none() {
        let mut cursor = Cursor::new(Vec::new());
        assert!(MessageBlock::read(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn reads_a_property_block() {
        let raw = b"K 10\nsvn:author\nV 5\nalice\nK 3\nlog\nV 11\nfix the bug\nPROPS-END\n";
        let mut cursor = Cursor::new(&raw[..]);
        let props = read_props(&mut cursor).unwrap().unwrap();
        assert_eq!(props.get("svn:author"), Some("alice"));
        assert_eq!(props.get("log"), Some("fix the bug"));
    }

    #[test]
    fn empty_props_stream_yields_none() {
        let mut cursor = Cursor::new(Vec::new());
        assert!(read_props(&mut cursor).unwrap().is_none());
    }
}
