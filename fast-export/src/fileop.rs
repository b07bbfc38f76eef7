//! File operations (`M`, `D`, `R`, `C`, `N`, `deleteall`) attached to a commit.
//!
//! An owned, independently constructible representation, rather than a generic-byte-type
//! borrow from a shared parse buffer.

use std::fmt::{self, Display, Formatter};

use crate::containers::OrderedSet;
use crate::error::FileOpError;
use crate::quoting::{quote_if_needed, unquote_c_style};

/// The mode bits fast-import accepts for an `M` operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileMode {
    Regular,
    Executable,
    Symlink,
    Submodule,
}

impl FileMode {
    pub fn as_str(self) -> &'static str {
        match self {
            FileMode::Regular => "100644",
            FileMode::Executable => "100755",
            FileMode::Symlink => "120000",
            FileMode::Submodule => "160000",
        }
    }

    pub fn parse(s: &str) -> Result<FileMode, FileOpError> {
        match s {
            "100644" => Ok(FileMode::Regular),
            "100755" => Ok(FileMode::Executable),
            "120000" => Ok(FileMode::Symlink),
            "160000" => Ok(FileMode::Submodule),
            _ => Err(FileOpError::InvalidMode(s.as_bytes().to_vec())),
        }
    }
}

/// What an `M` or `N` operation's content reference points at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlobRef {
    Mark(u64),
    Inline,
    Oid(String),
}

impl Display for BlobRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BlobRef::Mark(m) => write!(f, ":{m}"),
            BlobRef::Inline => write!(f, "inline"),
            BlobRef::Oid(oid) => write!(f, "{oid}"),
        }
    }
}

impl BlobRef {
    fn parse(s: &str) -> BlobRef {
        if s == "inline" {
            BlobRef::Inline
        } else if let Some(mark) = s.strip_prefix(':').and_then(|n| n.parse().ok()) {
            BlobRef::Mark(mark)
        } else {
            BlobRef::Oid(s.to_string())
        }
    }
}

/// A single file-tree change recorded within a commit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FileOp {
    Modify { mode: FileMode, r#ref: BlobRef, path: String },
    Delete { path: String },
    Rename { source: String, target: String },
    Copy { source: String, target: String },
    Note { r#ref: BlobRef, path: String },
    DeleteAll,
}

impl FileOp {
    /// Parses the text representation used within a fast-import commit body (the line
    /// with its trailing newline already stripped).
    pub fn parse(line: &str) -> Result<FileOp, FileOpError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return Err(FileOpError::Empty);
        }
        if line == "deleteall" {
            return Ok(FileOp::DeleteAll);
        }
        let (kind, rest) = line.split_once(' ').ok_or_else(|| FileOpError::UnknownKind(line.as_bytes().to_vec()))?;
        match kind {
            "M" => {
                let mut parts = rest.splitn(3, ' ');
                let mode = FileMode::parse(parts.next().ok_or(FileOpError::MissingField("mode"))?)?;
                let r#ref = BlobRef::parse(parts.next().ok_or(FileOpError::MissingField("ref"))?);
                let path = parse_path(parts.next().ok_or(FileOpError::MissingField("path"))?)?;
                Ok(FileOp::Modify { mode, r#ref, path })
            }
            "D" => Ok(FileOp::Delete { path: parse_path(rest)? }),
            "R" => {
                let (source, target) = split_two_paths(rest)?;
                Ok(FileOp::Rename { source, target })
            }
            "C" => {
                let (source, target) = split_two_paths(rest)?;
                Ok(FileOp::Copy { source, target })
            }
            "N" => {
                let mut parts = rest.splitn(2, ' ');
                let r#ref = BlobRef::parse(parts.next().ok_or(FileOpError::MissingField("ref"))?);
                let path = parse_path(parts.next().ok_or(FileOpError::MissingField("path"))?)?;
                Ok(FileOp::Note { r#ref, path })
            }
            _ => Err(FileOpError::UnknownKind(kind.as_bytes().to_vec())),
        }
    }

    /// The paths this operation mentions ({} for `deleteall`).
    pub fn paths(&self) -> OrderedSet<String> {
        let mut set = OrderedSet::new();
        match self {
            FileOp::Modify { path, .. } | FileOp::Delete { path } | FileOp::Note { path, .. } => {
                set.insert(path.clone());
            }
            FileOp::Rename { source, target } | FileOp::Copy { source, target } => {
                set.insert(source.clone());
                set.insert(target.clone());
            }
            FileOp::DeleteAll => {}
        }
        set
    }

    /// The single path this operation primarily sorts and dedups by.
    fn primary_path(&self) -> Option<&str> {
        match self {
            FileOp::Modify { path, .. } | FileOp::Delete { path } | FileOp::Note { path, .. } => Some(path),
            FileOp::Rename { target, .. } | FileOp::Copy { target, .. } => Some(target),
            FileOp::DeleteAll => None,
        }
    }

    /// Whether `self` and `other` touch overlapping paths.
    pub fn relevant(&self, other: &FileOp) -> bool {
        if matches!(self, FileOp::DeleteAll) || matches!(other, FileOp::DeleteAll) {
            return true;
        }
        self.paths().iter().any(|p| other.paths().contains(p))
    }
}

fn parse_path(s: &str) -> Result<String, FileOpError> {
    let s = s.trim();
    if let Some(quoted) = s.strip_prefix('"') {
        let bytes = unquote_c_style(quoted.as_bytes())?;
        String::from_utf8(bytes).map_err(|_| FileOpError::InvalidEscape)
    } else {
        Ok(s.to_string())
    }
}

fn split_two_paths(s: &str) -> Result<(String, String), FileOpError> {
    if let Some(rest) = s.strip_prefix('"') {
        let end = rest.find('"').ok_or(FileOpError::UnterminatedQuote)?;
        let source = parse_path(&s[..=end + 1])?;
        let remainder = rest[end + 1..].trim_start();
        let target = parse_path(remainder)?;
        Ok((source, target))
    } else {
        let (source, target) = s.split_once(' ').ok_or(FileOpError::MissingField("target"))?;
        Ok((parse_path(source)?, parse_path(target)?))
    }
}

impl Display for FileOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        fn fmt_path(p: &str) -> String {
            String::from_utf8_lossy(&quote_if_needed(p.as_bytes())).into_owned()
        }
        match self {
            FileOp::Modify { mode, r#ref, path } => {
                write!(f, "M {} {} {}", mode.as_str(), r#ref, fmt_path(path))
            }
            FileOp::Delete { path } => write!(f, "D {}", fmt_path(path)),
            FileOp::Rename { source, target } => write!(f, "R {} {}", fmt_path(source), fmt_path(target)),
            FileOp::Copy { source, target } => write!(f, "C {} {}", fmt_path(source), fmt_path(target)),
            FileOp::Note { r#ref, path } => write!(f, "N {} {}", r#ref, fmt_path(path)),
            FileOp::DeleteAll => write!(f, "deleteall"),
        }
    }
}

/// Sorts `ops` into canonical order: `deleteall` first, then by primary path, stable
/// among equals; then fuses redundant same-path `M` sequences (last writer wins).
pub fn canonicalize(ops: &mut Vec<FileOp>) {
    ops.sort_by(|a, b| match (a.primary_path(), b.primary_path()) {
        (None, None) => std::cmp::Ordering::Equal,
        (None, Some(_)) => std::cmp::Ordering::Less,
        (Some(_), None) => std::cmp::Ordering::Greater,
        (Some(p1), Some(p2)) => p1.cmp(p2),
    });
    let mut last_path: Option<String> = None;
    let mut out: Vec<FileOp> = Vec::with_capacity(ops.len());
    for op in ops.drain(..) {
        if let (Some(path), Some(last)) = (op.primary_path(), &last_path) {
            if path == last {
                out.pop();
            }
        }
        last_path = op.primary_path().map(str::to_string);
        out.push(op);
    }
    *ops = out;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_modify() {
        let op = FileOp::parse("M 100644 :3 src/main.rs").unwrap();
        assert_eq!(
            op,
            FileOp::Modify { mode: FileMode::Regular, r#ref: BlobRef::Mark(3), path: "src/main.rs".to_string() }
        );
    }

    #[test]
    fn parses_delete_all() {
        assert_eq!(FileOp::parse("deleteall").unwrap(), FileOp::DeleteAll);
    }

    #[test]
    fn parses_quoted_path() {
        let op = FileOp::parse("D \"has space\"").unwrap();
        assert_eq!(op, FileOp::Delete { path: "has space".to_string() });
    }

    #[test]
    fn round_trips_display_and_parse() {
        let op = FileOp::Modify { mode: FileMode::Executable, r#ref: BlobRef::Inline, path: "run.sh".to_string() };
        assert_eq!(FileOp::parse(&op.to_string()).unwrap(), op);
    }

    #[test]
    fn canonicalize_sorts_and_fuses_last_writer() {
        let mut ops = vec![
            FileOp::Modify { mode: FileMode::Regular, r#ref: BlobRef::Mark(6), path: "vat".into() },
            FileOp::Modify { mode: FileMode::Regular, r#ref: BlobRef::Mark(7), path: "rat".into() },
            FileOp::Modify { mode: FileMode::Regular, r#ref: BlobRef::Mark(8), path: "cat".into() },
            FileOp::Modify { mode: FileMode::Regular, r#ref: BlobRef::Mark(9), path: "rat".into() },
        ];
        canonicalize(&mut ops);
        assert_eq!(
            ops,
            vec![
                FileOp::Modify { mode: FileMode::Regular, r#ref: BlobRef::Mark(8), path: "cat".into() },
                FileOp::Modify { mode: FileMode::Regular, r#ref: BlobRef::Mark(9), path: "rat".into() },
                FileOp::Modify { mode: FileMode::Regular, r#ref: BlobRef::Mark(6), path: "vat".into() },
            ]
        );
    }

    #[test]
    fn canonicalize_puts_deleteall_first() {
        let mut ops = vec![
            FileOp::Delete { path: "a".into() },
            FileOp::DeleteAll,
        ];
        canonicalize(&mut ops);
        assert_eq!(ops[0], FileOp::DeleteAll);
    }

    #[test]
    fn canonicalize_lets_later_delete_subsume_earlier_modify() {
        let mut ops = vec![
            FileOp::Modify { mode: FileMode::Regular, r#ref: BlobRef::Mark(1), path: "a".into() },
            FileOp::Delete { path: "a".into() },
        ];
        canonicalize(&mut ops);
        assert_eq!(ops, vec![FileOp::Delete { path: "a".into() }]);
    }

    #[test]
    fn relevant_detects_overlap() {
        let a = FileOp::Delete { path: "x".into() };
        let b = FileOp::Modify { mode: FileMode::Regular, r#ref: BlobRef::Mark(1), path: "x".into() };
        let c = FileOp::Modify { mode: FileMode::Regular, r#ref: BlobRef::Mark(1), path: "y".into() };
        assert!(a.relevant(&b));
        assert!(!a.relevant(&c));
    }
}
