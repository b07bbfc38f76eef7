//! The event types a repository is built from: [`Blob`], [`Commit`], [`Tag`], [`Reset`],
//! and [`Passthrough`], tied together by [`Mark`].
//!
//! Plain owned structs throughout: no borrowed byte-storage generics, no parser
//! backreferences. A `Commit` can be cloned, mutated, and stored independently of
//! whatever produced it.

use std::fmt::{self, Display, Formatter};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::attribution::Attribution;
use crate::fileop::FileOp;

/// A symbolic `:N` identifier for a mark-bearing event. `:0` is reserved and never
/// constructed (see `ParseErrorKind::ZeroMark`), which is why this wraps a `NonZeroU64`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Mark(pub std::num::NonZeroU64);

impl Mark {
    pub fn new(n: u64) -> Option<Mark> {
        std::num::NonZeroU64::new(n).map(Mark)
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl Display for Mark {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, ":{}", self.0)
    }
}

static_assertions::assert_eq_size!(Mark, u64);
static_assertions::assert_eq_size!(Option<Mark>, u64);

/// Where a blob's payload currently lives.
#[derive(Clone, Debug)]
pub enum BlobContent {
    Inline(Vec<u8>),
    Spooled(PathBuf),
}

/// An opaque byte payload identified by a mark.
#[derive(Clone, Debug)]
pub struct Blob {
    pub mark: Mark,
    pub original_oid: Option<String>,
    content: BlobContent,
}

impl Blob {
    pub fn new(mark: Mark, content: Vec<u8>) -> Blob {
        Blob { mark, original_oid: None, content: BlobContent::Inline(content) }
    }

    pub fn spooled(mark: Mark, path: PathBuf) -> Blob {
        Blob { mark, original_oid: None, content: BlobContent::Spooled(path) }
    }

    pub fn set_content(&mut self, content: Vec<u8>) {
        match &self.content {
            BlobContent::Spooled(path) => {
                let _ = fs::write(path, &content);
            }
            BlobContent::Inline(_) => {
                self.content = BlobContent::Inline(content);
            }
        }
    }

    pub fn get_content(&self) -> io::Result<Vec<u8>> {
        match &self.content {
            BlobContent::Inline(bytes) => Ok(bytes.clone()),
            BlobContent::Spooled(path) => fs::read(path),
        }
    }

    pub fn size(&self) -> io::Result<u64> {
        match &self.content {
            BlobContent::Inline(bytes) => Ok(bytes.len() as u64),
            BlobContent::Spooled(path) => Ok(fs::metadata(path)?.len()),
        }
    }

    pub fn spool_path(&self) -> Option<&Path> {
        match &self.content {
            BlobContent::Spooled(path) => Some(path),
            BlobContent::Inline(_) => None,
        }
    }

    /// Moves this blob's content out to `path`, switching it from in-memory to spooled
    /// storage. A no-op if it is already spooled.
    pub fn spool_to(&mut self, path: PathBuf) -> io::Result<()> {
        if let BlobContent::Inline(bytes) = &self.content {
            fs::write(&path, bytes)?;
            self.content = BlobContent::Spooled(path);
        }
        Ok(())
    }

    /// Returns `true` when the content fails to decode as UTF-8. Named for the codec it
    /// checks rather than a generic `Codec` parameter, since UTF-8 is the only encoding
    /// any call site needs to check against.
    pub fn undecodable_utf8(&self) -> io::Result<bool> {
        Ok(std::str::from_utf8(&self.get_content()?).is_err())
    }
}

/// A reference to a commit, either by mark or (for `from`/`merge` lines that predate this
/// stream) by a literal object id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Commitish {
    Mark(Mark),
    Oid(String),
}

impl Display for Commitish {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Commitish::Mark(m) => write!(f, "{m}"),
            Commitish::Oid(oid) => write!(f, "{oid}"),
        }
    }
}

/// A snapshot: parents, attributions, a comment, and file operations.
#[derive(Clone, Debug)]
pub struct Commit {
    pub mark: Option<Mark>,
    pub branch: String,
    pub authors: Vec<Attribution>,
    pub committer: Attribution,
    pub comment: String,
    pub parents: Vec<Commitish>,
    pub file_operations: Vec<FileOp>,
    pub legacy_id: Option<String>,
}

impl Commit {
    pub fn new(branch: impl Into<String>, committer: Attribution) -> Commit {
        Commit {
            mark: None,
            branch: branch.into(),
            authors: Vec::new(),
            committer,
            comment: String::new(),
            parents: Vec::new(),
            file_operations: Vec::new(),
            legacy_id: None,
        }
    }

    pub fn add_parent_by_mark(&mut self, mark: Mark) {
        self.parents.push(Commitish::Mark(mark));
    }

    /// Inserts a parent at position `i`. An out-of-range index is an internal-invariant
    /// complaint, not a panic: it is logged and the commit is left unchanged.
    pub fn insert_parent(&mut self, i: usize, mark: Mark) {
        if i > self.parents.len() {
            tracing::warn!(index = i, len = self.parents.len(), "insertParent: index out of range, ignoring");
            return;
        }
        self.parents.insert(i, Commitish::Mark(mark));
    }

    pub fn remove_parent(&mut self, mark: Mark) {
        self.parents.retain(|p| *p != Commitish::Mark(mark));
    }

    pub fn append_operation(&mut self, op: FileOp) {
        self.file_operations.push(op);
    }

    pub fn sort_operations(&mut self) {
        crate::fileop::canonicalize(&mut self.file_operations);
    }

    pub fn canonicalize(&mut self) {
        self.sort_operations();
    }

    /// Whether every operation (after applying `filter`, if given) is a delete.
    pub fn alldeletes(&self, filter: impl Fn(&FileOp) -> bool) -> bool {
        self.file_operations
            .iter()
            .filter(|op| filter(op))
            .all(|op| matches!(op, FileOp::Delete { .. } | FileOp::DeleteAll))
    }

    /// Whether any file operation references `mark` as its blob.
    pub fn references(&self, mark: Mark) -> bool {
        self.file_operations.iter().any(|op| match op {
            FileOp::Modify { r#ref: crate::fileop::BlobRef::Mark(m), .. }
            | FileOp::Note { r#ref: crate::fileop::BlobRef::Mark(m), .. } => *m == mark.get(),
            _ => false,
        })
    }

    /// `<rfc3339>!<email-or-name>` for an explicitly chosen attribution, the building
    /// block [`action_stamp`](Commit::action_stamp) specializes to the author-else-
    /// committer default.
    pub fn stamp(&self, attribution: &Attribution) -> String {
        let ident = if attribution.email.is_empty() { attribution.fullname.as_str() } else { attribution.email.as_str() };
        format!("{}!{}", attribution.date.to_rfc3339(), ident)
    }

    /// `<rfc3339>!<author-email-or-name>`, a stable cross-repository identifier. Uses the
    /// first author when one or more are present, falling back to the committer.
    pub fn action_stamp(&self) -> String {
        self.stamp(self.authors.first().unwrap_or(&self.committer))
    }

    /// A fixed-width, human-readable summary line: event number, action stamp, the paths
    /// touched that pass `path_filter`, and the comment's first line, truncated to
    /// `width_hint` columns when that's nonzero.
    pub fn lister(&self, path_filter: impl Fn(&str) -> bool, event_index: usize, width_hint: usize) -> String {
        let mut line = format!("{:>6} {}", event_index, self.action_stamp());
        let touched = self.paths(path_filter);
        if !touched.is_empty() {
            line.push(' ');
            line.push_str(&touched.to_string());
        }
        if let Some(first_line) = self.comment.lines().next() {
            line.push_str(" \"");
            line.push_str(first_line);
            line.push('"');
        }
        if width_hint > 0 && line.chars().count() > width_hint {
            line = line.chars().take(width_hint).collect();
        }
        line
    }

    /// The branch this commit sets as its ref's head.
    pub fn head(&self) -> &str {
        &self.branch
    }

    /// The legacy identifier carried over from a prior VCS migration (e.g. an SVN revision
    /// or CVS revision string), if any survived into this stream.
    pub fn showlegacy(&self) -> Option<&str> {
        self.legacy_id.as_deref()
    }

    /// The union of paths this commit's own file operations mention (ancestry is not
    /// consulted; see [`crate::fileop::FileOp::paths`]).
    pub fn paths(&self, filter: impl Fn(&str) -> bool) -> crate::containers::OrderedSet<String> {
        let mut set = crate::containers::OrderedSet::new();
        for op in &self.file_operations {
            for path in op.paths().iter() {
                if filter(path) {
                    set.insert(path.clone());
                }
            }
        }
        set
    }
}

/// A named, attributed pointer to a commit.
#[derive(Clone, Debug)]
pub struct Tag {
    pub mark: Option<Mark>,
    pub name: String,
    pub committish: Commitish,
    pub tagger: Option<Attribution>,
    pub comment: String,
}

/// A branch-head assignment directive.
#[derive(Clone, Debug)]
pub struct Reset {
    pub branch: String,
    pub from: Option<Commitish>,
}

/// A literal stream fragment preserved verbatim (notably the terminal `done`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Passthrough {
    pub text: String,
}

impl Passthrough {
    pub fn is_done(&self) -> bool {
        self.text.trim_end() == "done"
    }
}

/// A tagged event, as stored in a repository's event sequence.
#[derive(Clone, Debug)]
pub enum Event {
    Blob(Blob),
    Commit(Commit),
    Tag(Tag),
    Reset(Reset),
    Passthrough(Passthrough),
}

impl Event {
    pub fn mark(&self) -> Option<Mark> {
        match self {
            Event::Blob(b) => Some(b.mark),
            Event::Commit(c) => c.mark,
            Event::Tag(t) => t.mark,
            Event::Reset(_) | Event::Passthrough(_) => None,
        }
    }
}
