//! The fast-import stream parser.
//!
//! Dispatches on the directive keyword (`blob`, `commit `, `tag `, `reset `, `done`) and
//! appends owned [`Event`]s directly to a `Vec`, rather than borrowing from a single
//! reusable command buffer: this parser builds a long-lived, mutable graph, so each
//! directive's payload is copied into its own heap allocation as it's read.

use std::io::BufRead;

use crate::attribution::Attribution;
use crate::error::{ParseError, ParseErrorKind, StreamError};
use crate::fileop::FileOp;
use crate::model::{Blob, Commit, Commitish, Event, Mark, Passthrough, Reset, Tag};

/// Parses an entire fast-import stream into an ordered list of events.
///
/// Only checks that every `:N` reference resolves to a mark defined earlier in the same
/// stream (stream corruption per se); it does not enforce graph-level invariants like mark
/// uniqueness or parent soundness across mutations — that is `Repository::add_event`'s job,
/// so partial streams can still be inspected event-by-event before being folded into a
/// graph.
pub fn parse_stream<R: BufRead>(r: &mut R) -> Result<Vec<Event>, StreamError> {
    let mut events = Vec::new();
    let mut line = Vec::new();
    loop {
        line.clear();
        let n = r.read_until(b'\n', &mut line)?;
        if n == 0 {
            break;
        }
        let trimmed = strip_eol(&line);
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.starts_with(b"#") {
            continue;
        }
        if trimmed == b"blob" {
            events.push(Event::Blob(parse_blob(r)?));
        } else if let Some(rest) = trimmed.strip_prefix(b"commit ") {
            events.push(Event::Commit(parse_commit(r, rest)?));
        } else if let Some(rest) = trimmed.strip_prefix(b"tag ") {
            events.push(Event::Tag(parse_tag(r, rest)?));
        } else if let Some(rest) = trimmed.strip_prefix(b"reset ") {
            events.push(Event::Reset(parse_reset(r, rest)?));
        } else if trimmed == b"done" {
            events.push(Event::Passthrough(Passthrough { text: "done".to_string() }));
        } else if trimmed.starts_with(b"progress ") || trimmed == b"checkpoint" || trimmed.starts_with(b"feature ")
            || trimmed.starts_with(b"option ")
        {
            events.push(Event::Passthrough(Passthrough { text: String::from_utf8_lossy(trimmed).into_owned() }));
        } else {
            return Err(ParseError::new(ParseErrorKind::UnsupportedCommand(trimmed.to_vec()), line.clone()).into());
        }
    }
    check_marks_resolved(&events)?;
    Ok(events)
}

/// Every `:N` mark a commit, tag, or reset refers to (a parent, a tag target, a `from`, or
/// a file-operation blob reference) must name a blob or commit mark defined earlier in the
/// same stream. A reference to a mark that was never defined is stream corruption, fatal to
/// the current parse.
fn check_marks_resolved(events: &[Event]) -> Result<(), ParseError> {
    let mut defined = std::collections::HashSet::new();
    for event in events {
        match event {
            Event::Blob(b) => {
                defined.insert(b.mark.get());
            }
            Event::Commit(c) => {
                if let Some(m) = c.mark {
                    defined.insert(m.get());
                }
            }
            _ => {}
        }
    }
    let unresolved = |m: u64| ParseError::new(ParseErrorKind::UnresolvedMark(m), Vec::new());
    for event in events {
        match event {
            Event::Commit(c) => {
                for p in &c.parents {
                    if let Commitish::Mark(m) = p {
                        if !defined.contains(&m.get()) {
                            return Err(unresolved(m.get()));
                        }
                    }
                }
                for op in &c.file_operations {
                    if let Some(m) = fileop_blob_mark(op) {
                        if !defined.contains(&m) {
                            return Err(unresolved(m));
                        }
                    }
                }
            }
            Event::Tag(t) => {
                if let Commitish::Mark(m) = &t.committish {
                    if !defined.contains(&m.get()) {
                        return Err(unresolved(m.get()));
                    }
                }
            }
            Event::Reset(r) => {
                if let Some(Commitish::Mark(m)) = &r.from {
                    if !defined.contains(&m.get()) {
                        return Err(unresolved(m.get()));
                    }
                }
            }
            Event::Blob(_) | Event::Passthrough(_) => {}
        }
    }
    Ok(())
}

fn fileop_blob_mark(op: &FileOp) -> Option<u64> {
    match op {
        FileOp::Modify { r#ref: crate::fileop::BlobRef::Mark(m), .. }
        | FileOp::Note { r#ref: crate::fileop::BlobRef::Mark(m), .. } => Some(*m),
        _ => None,
    }
}

fn strip_eol(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    if end > 0 && line[end - 1] == b'\n' {
        end -= 1;
    }
    if end > 0 && line[end - 1] == b'\r' {
        end -= 1;
    }
    &line[..end]
}

fn parse_u64(s: &[u8]) -> Option<u64> {
    if s.is_empty() || !s.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(s).ok()?.parse().ok()
}

fn parse_mark_ref(s: &[u8], line: &[u8]) -> Result<Mark, ParseError> {
    let digits = s.strip_prefix(b":").ok_or_else(|| ParseError::new(ParseErrorKind::InvalidMark(s.to_vec()), line))?;
    let n = parse_u64(digits).ok_or_else(|| ParseError::new(ParseErrorKind::InvalidMark(s.to_vec()), line))?;
    Mark::new(n).ok_or_else(|| ParseError::new(ParseErrorKind::ZeroMark, line))
}

fn read_line<R: BufRead>(r: &mut R) -> std::io::Result<Vec<u8>> {
    let mut line = Vec::new();
    r.read_until(b'\n', &mut line)?;
    Ok(line)
}

fn peek_is<R: BufRead>(r: &mut R, prefix: &[u8]) -> std::io::Result<bool> {
    let buf = r.fill_buf()?;
    Ok(buf.starts_with(prefix))
}

/// Reads a `data <len>\n<len bytes>` or `data <<DELIM\n...\nDELIM\n` block. The line
/// introducing it (`data ...`) has already been read into `header_line`.
fn read_data<R: BufRead>(r: &mut R, header_line: &[u8]) -> Result<Vec<u8>, ParseError> {
    let rest = header_line
        .strip_prefix(b"data ")
        .ok_or_else(|| ParseError::new(ParseErrorKind::ExpectedDataCommand, header_line))?;
    if let Some(delim) = rest.strip_prefix(b"<<") {
        let delim = strip_eol(delim).to_vec();
        if delim.is_empty() {
            return Err(ParseError::new(ParseErrorKind::EmptyDelim, header_line));
        }
        if delim.contains(&0) {
            return Err(ParseError::new(ParseErrorKind::DataDelimContainsNul, header_line));
        }
        let mut data = Vec::new();
        loop {
            let line = read_line(r).map_err(|_| ParseError::new(ParseErrorKind::UnterminatedData, header_line))?;
            if line.is_empty() {
                return Err(ParseError::new(ParseErrorKind::UnterminatedData, header_line));
            }
            if strip_eol(&line) == delim.as_slice() {
                break;
            }
            data.extend_from_slice(&line);
        }
        if data.ends_with(b"\n") {
            data.pop();
        }
        Ok(data)
    } else {
        let len_bytes = strip_eol(rest);
        let len = parse_u64(len_bytes)
            .ok_or_else(|| ParseError::new(ParseErrorKind::InvalidDataLength(len_bytes.to_vec()), header_line))?
            as usize;
        let mut data = vec![0u8; len];
        r.read_exact(&mut data).map_err(|_| ParseError::new(ParseErrorKind::DataUnexpectedEof, header_line))?;
        // The LF after a counted data block is optional (not counted in `len`); consume it
        // only when present, rather than requiring it.
        let buf = r.fill_buf().map_err(|_| ParseError::new(ParseErrorKind::DataUnexpectedEof, header_line))?;
        if buf.first() == Some(&b'\n') {
            r.consume(1);
        }
        Ok(data)
    }
}

fn parse_blob<R: BufRead>(r: &mut R) -> Result<Blob, ParseError> {
    let mut line = read_line(r)?;
    let mut mark = None;
    if strip_eol(&line).starts_with(b"mark ") {
        let digits = strip_eol(&line)[5..].to_vec();
        mark = Some(parse_mark_ref(&digits, &line)?);
        line = read_line(r)?;
    }
    if strip_eol(&line).starts_with(b"original-oid ") {
        line = read_line(r)?;
    }
    let content = read_data(r, strip_eol(&line))?;
    let mark = mark.ok_or_else(|| ParseError::new(ParseErrorKind::InvalidMark(Vec::new()), &line))?;
    Ok(Blob::new(mark, content))
}

fn parse_commit<R: BufRead>(r: &mut R, ref_line: &[u8]) -> Result<Commit, ParseError> {
    let branch = String::from_utf8_lossy(ref_line).into_owned();
    let mut mark = None;
    let mut authors = Vec::new();
    let mut committer = None;
    let mut parents = Vec::new();
    let mut comment = String::new();

    let mut line = read_line(r)?;
    if strip_eol(&line).starts_with(b"mark ") {
        let digits = strip_eol(&line)[5..].to_vec();
        mark = Some(parse_mark_ref(&digits, &line)?);
        line = read_line(r)?;
    }
    if strip_eol(&line).starts_with(b"original-oid ") {
        line = read_line(r)?;
    }
    // A commit may carry more than one `author` line (co-authorship); each is kept in order.
    while let Some(rest) = strip_eol(&line).strip_prefix(b"author ") {
        authors.push(
            Attribution::parse(&String::from_utf8_lossy(rest))
                .map_err(|e| ParseError::new(ParseErrorKind::Attribution(e), &line))?,
        );
        line = read_line(r)?;
    }
    if let Some(rest) = strip_eol(&line).strip_prefix(b"committer ") {
        committer = Some(
            Attribution::parse(&String::from_utf8_lossy(rest))
                .map_err(|e| ParseError::new(ParseErrorKind::Attribution(e), &line))?,
        );
        line = read_line(r)?;
    }
    let committer = committer.ok_or_else(|| ParseError::new(ParseErrorKind::MissingCommitter, &line))?;
    if strip_eol(&line).starts_with(b"data ") {
        comment = String::from_utf8_lossy(&read_data(r, strip_eol(&line))?).into_owned();
    }

    loop {
        if peek_is(r, b"from ")? {
            let line = read_line(r)?;
            let mark_bytes = strip_eol(&line)[5..].to_vec();
            parents.push(parse_commitish(&mark_bytes, &line)?);
        } else {
            break;
        }
    }
    loop {
        if peek_is(r, b"merge ")? {
            let line = read_line(r)?;
            let mark_bytes = strip_eol(&line)[6..].to_vec();
            parents.push(parse_commitish(&mark_bytes, &line)?);
        } else {
            break;
        }
    }

    let mut file_operations = Vec::new();
    loop {
        let peek = r.fill_buf()?;
        if peek.is_empty() {
            break;
        }
        let is_fileop = peek.starts_with(b"M ")
            || peek.starts_with(b"D ")
            || peek.starts_with(b"R ")
            || peek.starts_with(b"C ")
            || peek.starts_with(b"N ")
            || peek.starts_with(b"deleteall");
        if !is_fileop {
            break;
        }
        let line = read_line(r)?;
        let text = String::from_utf8_lossy(strip_eol(&line)).into_owned();
        let op = FileOp::parse(&text).map_err(|e| ParseError::new(ParseErrorKind::FileOp(e), &line))?;
        file_operations.push(op);
    }

    Ok(Commit { mark, branch, authors, committer, comment, parents, file_operations, legacy_id: None })
}

fn parse_commitish(s: &[u8], line: &[u8]) -> Result<Commitish, ParseError> {
    if let Some(digits) = s.strip_prefix(b":") {
        let n = parse_u64(digits).ok_or_else(|| ParseError::new(ParseErrorKind::InvalidMark(s.to_vec()), line))?;
        let mark = Mark::new(n).ok_or_else(|| ParseError::new(ParseErrorKind::ZeroMark, line))?;
        Ok(Commitish::Mark(mark))
    } else {
        Ok(Commitish::Oid(String::from_utf8_lossy(s).into_owned()))
    }
}

fn parse_tag<R: BufRead>(r: &mut R, name_line: &[u8]) -> Result<Tag, ParseError> {
    let name = String::from_utf8_lossy(name_line).into_owned();
    let mut line = read_line(r)?;
    let from_line = strip_eol(&line)
        .strip_prefix(b"from ")
        .ok_or_else(|| ParseError::new(ParseErrorKind::ExpectedDataCommand, &line))?
        .to_vec();
    let committish = parse_commitish(&from_line, &line)?;
    line = read_line(r)?;
    let mut tagger = None;
    if let Some(rest) = strip_eol(&line).strip_prefix(b"tagger ") {
        tagger = Some(
            Attribution::parse(&String::from_utf8_lossy(rest))
                .map_err(|e| ParseError::new(ParseErrorKind::Attribution(e), &line))?,
        );
        line = read_line(r)?;
    }
    let comment = String::from_utf8_lossy(&read_data(r, strip_eol(&line))?).into_owned();
    Ok(Tag { mark: None, name, committish, tagger, comment })
}

fn parse_reset<R: BufRead>(r: &mut R, branch_line: &[u8]) -> Result<Reset, ParseError> {
    let branch = String::from_utf8_lossy(branch_line).into_owned();
    let mut from = None;
    if peek_is(r, b"from ")? {
        let line = read_line(r)?;
        let mark_bytes = strip_eol(&line)[5..].to_vec();
        from = Some(parse_commitish(&mark_bytes, &line)?);
    }
    Ok(Reset { branch, from })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parses_a_blob() {
        let stream = b"blob\nmark :1\ndata 5\nhello\n";
        let mut cursor = Cursor::new(&stream[..]);
        let events = parse_stream(&mut cursor).unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            Event::Blob(b) => {
                assert_eq!(b.mark, Mark::new(1).unwrap());
                assert_eq!(b.get_content().unwrap(), b"hello");
            }
            _ => panic!("expected blob"),
        }
    }

    #[test]
    fn parses_a_commit_with_fileops() {
        let stream = b"blob\nmark :1\ndata 5\nhello\n\
commit refs/heads/master\nmark :2\ncommitter A <a@example.com> 0 +0000\ndata 4\ntest\nM 100644 :1 a.txt\n";
        let mut cursor = Cursor::new(&stream[..]);
        let events = parse_stream(&mut cursor).unwrap();
        assert_eq!(events.len(), 2);
        match &events[1] {
            Event::Commit(c) => {
                assert_eq!(c.branch, "refs/heads/master");
                assert_eq!(c.comment, "test");
                assert_eq!(c.file_operations.len(), 1);
            }
            _ => panic!("expected commit"),
        }
    }

    #[test]
    fn parses_a_commit_with_multiple_authors() {
        let stream = b"commit refs/heads/master\nmark :1\nauthor A <a@example.com> 0 +0000\n\
author B <b@example.com> 0 +0000\ncommitter C <c@example.com> 0 +0000\ndata 4\ntest\n";
        let mut cursor = Cursor::new(&stream[..]);
        let events = parse_stream(&mut cursor).unwrap();
        match &events[0] {
            Event::Commit(c) => {
                assert_eq!(c.authors.len(), 2);
                assert_eq!(c.authors[0].email, "a@example.com");
                assert_eq!(c.authors[1].email, "b@example.com");
                assert_eq!(c.committer.email, "c@example.com");
            }
            _ => panic!("expected commit"),
        }
    }

    #[test]
    fn parses_reset_with_from() {
        let stream = b"commit refs/heads/master\nmark :2\ncommitter A <a@example.com> 0 +0000\ndata 4\ntest\n\
reset refs/heads/master\nfrom :2\n";
        let mut cursor = Cursor::new(&stream[..]);
        let events = parse_stream(&mut cursor).unwrap();
        match &events[1] {
            Event::Reset(r) => {
                assert_eq!(r.branch, "refs/heads/master");
                assert_eq!(r.from, Some(Commitish::Mark(Mark::new(2).unwrap())));
            }
            _ => panic!("expected reset"),
        }
    }

    #[test]
    fn rejects_unresolved_mark_reference_at_end_of_parse() {
        let stream = b"reset refs/heads/master\nfrom :2\n";
        let mut cursor = Cursor::new(&stream[..]);
        let err = parse_stream(&mut cursor).unwrap_err();
        assert!(matches!(
            err,
            StreamError::Parse(ParseError { kind: ParseErrorKind::UnresolvedMark(2), .. })
        ));
    }

    #[test]
    fn rejects_zero_mark() {
        let stream = b"blob\nmark :0\ndata 1\nx\n";
        let mut cursor = Cursor::new(&stream[..]);
        assert!(parse_stream(&mut cursor).is_err());
    }

    #[test]
    fn parses_delimited_data() {
        let stream = b"blob\nmark :1\ndata <<EOF\nhello\nEOF\n";
        let mut cursor = Cursor::new(&stream[..]);
        let events = parse_stream(&mut cursor).unwrap();
        match &events[0] {
            Event::Blob(b) => assert_eq!(b.get_content().unwrap(), b"hello"),
            _ => panic!("expected blob"),
        }
    }

    #[test]
    fn passthrough_preserves_done() {
        let stream = b"done\n";
        let mut cursor = Cursor::new(&stream[..]);
        let events = parse_stream(&mut cursor).unwrap();
        match &events[0] {
            Event::Passthrough(p) => assert!(p.is_done()),
            _ => panic!("expected passthrough"),
        }
    }
}
