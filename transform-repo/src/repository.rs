//! [`Repository`]: the mutable, invariant-checked event graph built on top of
//! `fast_export`'s format-level types.
//!
//! The depth of a commit is one more than the max depth of any of its ancestors,
//! identified by their mark; [`Repository::ancestors`] walks exactly this relation.

use std::collections::{HashMap, HashSet};
use std::io::BufRead;
use std::path::{Path, PathBuf};

use fast_export::attribution::AuthorMap;
use fast_export::model::{Commit, Commitish, Event, Mark, Tag};
use fast_export::refs::{Refname, RefnameFlag};
use fast_export::{export, import};

use crate::error::RepositoryError;
use crate::spool::Spool;

/// Blobs larger than this are spooled to disk as they are appended rather than kept
/// in memory; smaller blobs stay inline.
const SPOOL_THRESHOLD: usize = 1 << 20;

/// An ordered graph of fast-import events with mark uniqueness, parent-soundness, and
/// tag-target invariants enforced on every insertion.
pub struct Repository {
    pub name: String,
    base_dir: PathBuf,
    events: Vec<Event>,
    mark_index: HashMap<u64, usize>,
    spool: Option<Spool>,
    pub author_map: AuthorMap,
}

/// Validates a commit/reset `branch` field as a Git refname, tolerating one-level names
/// (`master`) the way `git fast-import` does rather than requiring a full `refs/...` path.
fn check_refname(branch: &str) -> Result<(), RepositoryError> {
    Refname::new(branch, RefnameFlag::AllowOneLevel.into())
        .map(|_| ())
        .map_err(|e| RepositoryError::InvalidRefname(branch.to_string(), e))
}

impl Repository {
    /// Creates an empty repository, acquiring its blob spool directory immediately: the
    /// spool is exclusively owned for the repository's lifetime and is released by
    /// [`Repository::cleanup`] or on drop.
    pub fn new(name: impl Into<String>, base_dir: impl Into<PathBuf>) -> io::Result<Repository> {
        let name = name.into();
        let base_dir = base_dir.into();
        let spool = Spool::create(&base_dir, &name, std::process::id())?;
        Ok(Repository { name, base_dir, events: Vec::new(), mark_index: HashMap::new(), spool: Some(spool), author_map: AuthorMap::default() })
    }

    /// Parses `r` as a fast-import stream and folds every event into this repository,
    /// enforcing invariants as each one is appended.
    pub fn fast_import<R: BufRead>(&mut self, r: &mut R) -> Result<(), RepositoryError> {
        let parsed = import::parse_stream(r)?;
        for event in parsed {
            self.add_event(event)?;
        }
        Ok(())
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Appends `event`, unless it is a terminal `done` passthrough already present, in
    /// which case `event` is inserted immediately before it. Validates mark uniqueness,
    /// parent soundness (every parent/blob-ref resolves to an earlier event), and tag
    /// targets.
    pub fn add_event(&mut self, mut event: Event) -> Result<(), RepositoryError> {
        if let Event::Blob(blob) = &mut event {
            self.maybe_spool(blob)?;
        }
        if let Some(mark) = event.mark() {
            if self.mark_index.contains_key(&mark.get()) {
                return Err(RepositoryError::DuplicateMark(mark.get()));
            }
        }
        if let Event::Commit(c) = &event {
            check_refname(&c.branch)?;
        }
        if let Event::Reset(r) = &event {
            check_refname(&r.branch)?;
        }
        if let Event::Commit(c) = &event {
            for parent in &c.parents {
                if let Commitish::Mark(m) = parent {
                    if !self.mark_index.contains_key(&m.get()) {
                        return Err(RepositoryError::UnresolvedParent(m.get()));
                    }
                }
            }
            for op in &c.file_operations {
                use fast_export::fileop::{BlobRef, FileOp};
                let r#ref = match op {
                    FileOp::Modify { r#ref, .. } | FileOp::Note { r#ref, .. } => Some(r#ref),
                    _ => None,
                };
                if let Some(BlobRef::Mark(m)) = r#ref {
                    if !self.mark_index.contains_key(m) {
                        return Err(RepositoryError::UnresolvedBlobRef(*m));
                    }
                }
            }
        }
        if let Event::Tag(t) = &event {
            if let Commitish::Mark(m) = &t.committish {
                if !self.mark_index.contains_key(&m.get()) {
                    return Err(RepositoryError::UnresolvedTagTarget(t.name.clone()));
                }
            }
        }

        let insert_at = self.terminal_done_index().unwrap_or(self.events.len());
        if let Some(mark) = event.mark() {
            self.mark_index.insert(mark.get(), insert_at);
        }
        if insert_at == self.events.len() {
            self.events.push(event);
        } else {
            self.events.insert(insert_at, event);
            self.reindex_from(insert_at + 1);
        }
        Ok(())
    }

    /// Spools `blob`'s content to disk in place when it exceeds [`SPOOL_THRESHOLD`] and
    /// isn't already spooled.
    fn maybe_spool(&mut self, blob: &mut fast_export::model::Blob) -> Result<(), RepositoryError> {
        if blob.spool_path().is_some() {
            return Ok(());
        }
        if blob.size()? < SPOOL_THRESHOLD as u64 {
            return Ok(());
        }
        let Some(spool) = self.spool.as_mut() else { return Ok(()) };
        let path = spool.allocate()?;
        blob.spool_to(path)?;
        Ok(())
    }

    fn terminal_done_index(&self) -> Option<usize> {
        self.events.iter().position(|e| matches!(e, Event::Passthrough(p) if p.is_done()))
    }

    fn reindex_from(&mut self, start: usize) {
        for (i, event) in self.events.iter().enumerate().skip(start) {
            if let Some(mark) = event.mark() {
                self.mark_index.insert(mark.get(), i);
            }
        }
    }

    pub fn mark_to_event(&self, mark: Mark) -> Option<&Event> {
        self.mark_index.get(&mark.get()).map(|&i| &self.events[i])
    }

    pub fn find(&self, mark: Mark) -> Option<usize> {
        self.mark_index.get(&mark.get()).copied()
    }

    /// Finds `event`'s position by identity rather than by mark, for the (unmarked)
    /// Reset and Passthrough events `find` can't look up.
    pub fn event_to_index(&self, event: &Event) -> Option<usize> {
        self.events.iter().position(|e| std::ptr::eq(e, event))
    }

    pub fn all(&self) -> impl Iterator<Item = usize> {
        0..self.events.len()
    }

    pub fn event(&self, i: usize) -> &Event {
        &self.events[i]
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub(crate) fn events_mut(&mut self) -> &mut Vec<Event> {
        &mut self.events
    }

    pub(crate) fn rebuild_mark_index(&mut self) {
        self.mark_index.clear();
        for (i, event) in self.events.iter().enumerate() {
            if let Some(mark) = event.mark() {
                self.mark_index.insert(mark.get(), i);
            }
        }
    }

    pub fn commits(&self) -> impl Iterator<Item = (usize, &Commit)> {
        self.events.iter().enumerate().filter_map(|(i, e)| match e {
            Event::Commit(c) => Some((i, c)),
            _ => None,
        })
    }

    pub fn tags(&self) -> impl Iterator<Item = (usize, &Tag)> {
        self.events.iter().enumerate().filter_map(|(i, e)| match e {
            Event::Tag(t) => Some((i, t)),
            _ => None,
        })
    }

    pub fn earliest_commit(&self) -> Option<usize> {
        self.commits().next().map(|(i, _)| i)
    }

    /// All commit indices reachable by following parent edges from the commit at `i`,
    /// excluding `i` itself. The depth of a commit is one more than the max depth of any
    /// of its ancestors.
    pub fn ancestors(&self, i: usize) -> HashSet<usize> {
        let mut seen = HashSet::new();
        let mut stack = vec![i];
        while let Some(idx) = stack.pop() {
            let Event::Commit(c) = &self.events[idx] else { continue };
            for parent in &c.parents {
                if let Commitish::Mark(m) = parent {
                    if let Some(&pi) = self.mark_index.get(&m.get()) {
                        if seen.insert(pi) {
                            stack.push(pi);
                        }
                    }
                }
            }
        }
        seen
    }

    /// Commits whose parents list contains the mark of the commit at `i`.
    pub fn children(&self, i: usize) -> Vec<usize> {
        let Some(mark) = self.events[i].mark() else { return Vec::new() };
        self.commits()
            .filter(|(_, c)| c.parents.contains(&Commitish::Mark(mark)))
            .map(|(ci, _)| ci)
            .collect()
    }

    /// Whether the commit at `i` is transitively reachable from the commit at `other` by
    /// following parent edges (i.e. `other` descends from `i`).
    pub fn descended_from(&self, other: usize, i: usize) -> bool {
        self.ancestors(other).contains(&i)
    }

    /// Indices of tags whose committish resolves to the mark of the commit at `i`.
    pub fn tags_targeting(&self, i: usize) -> Vec<usize> {
        let Some(mark) = self.events[i].mark() else { return Vec::new() };
        self.tags().filter(|(_, t)| t.committish == Commitish::Mark(mark)).map(|(ti, _)| ti).collect()
    }

    /// The full path -> (mode, blob ref) mapping live at the commit at `i`, built by
    /// composing the first parent's manifest (fast-import streams encode each commit as a
    /// diff against its first parent) with this commit's own file operations in order:
    /// `deleteall` clears, `D` removes, `R` renames, `C` duplicates, `M` sets.
    pub fn manifest(&self, i: usize) -> HashMap<String, (fast_export::fileop::FileMode, fast_export::fileop::BlobRef)> {
        use fast_export::fileop::FileOp;

        let Event::Commit(c) = &self.events[i] else { return HashMap::new() };
        let mut manifest = match c.parents.first() {
            Some(Commitish::Mark(m)) => self.find(*m).map(|pi| self.manifest(pi)).unwrap_or_default(),
            _ => HashMap::new(),
        };
        for op in &c.file_operations {
            match op {
                FileOp::DeleteAll => manifest.clear(),
                FileOp::Delete { path } => {
                    manifest.remove(path);
                }
                FileOp::Rename { source, target } => {
                    if let Some(entry) = manifest.remove(source) {
                        manifest.insert(target.clone(), entry);
                    }
                }
                FileOp::Copy { source, target } => {
                    if let Some(entry) = manifest.get(source).cloned() {
                        manifest.insert(target.clone(), entry);
                    }
                }
                FileOp::Modify { mode, r#ref, path } => {
                    manifest.insert(path.clone(), (*mode, r#ref.clone()));
                }
                FileOp::Note { .. } => {}
            }
        }
        manifest
    }

    /// Whether `path` is live at the commit at `i`, and if so the blob reference that last
    /// set it.
    pub fn visible(&self, i: usize, path: &str) -> Option<fast_export::fileop::BlobRef> {
        self.manifest(i).remove(path).map(|(_, r#ref)| r#ref)
    }

    /// Unique branch names, in the order they are first seen.
    pub fn branchset(&self) -> fast_export::containers::OrderedSet<String> {
        let mut set = fast_export::containers::OrderedSet::new();
        for event in &self.events {
            match event {
                Event::Commit(c) => {
                    set.insert(c.branch.clone());
                }
                Event::Reset(r) => {
                    set.insert(r.branch.clone());
                }
                _ => {}
            }
        }
        set
    }

    /// Branch name -> mark of its current head, following stream order.
    pub fn branchmap(&self) -> HashMap<String, Mark> {
        let mut map = HashMap::new();
        for event in &self.events {
            match event {
                Event::Commit(c) => {
                    if let Some(mark) = c.mark {
                        map.insert(c.branch.clone(), mark);
                    }
                }
                Event::Reset(r) => {
                    if let Some(Commitish::Mark(m)) = &r.from {
                        map.insert(r.branch.clone(), *m);
                    }
                }
                _ => {}
            }
        }
        map
    }

    /// Number of bytes the emitter would produce for the current event sequence.
    pub fn size(&self) -> Result<u64, RepositoryError> {
        let mut counter = ByteCounter(0);
        export::write_stream(&mut counter, &self.events).map_err(|e| match e {
            fast_export::ExportError::Io(io) => RepositoryError::Io(io),
            other => RepositoryError::Io(io::Error::new(io::ErrorKind::Other, other.to_string())),
        })?;
        Ok(counter.0)
    }

    pub fn spool_mut(&mut self) -> Option<&mut Spool> {
        self.spool.as_mut()
    }

    /// Releases the blob spool directory. Safe to call more than once.
    pub fn cleanup(&mut self) -> io::Result<()> {
        if let Some(spool) = self.spool.take() {
            spool.cleanup()?;
        }
        Ok(())
    }
}

impl Drop for Repository {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}

use std::io;

struct ByteCounter(u64);
impl std::io::Write for ByteCounter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0 += buf.len() as u64;
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fast_export::attribution::Attribution;
    use fast_export::model::{Blob, Mark};
    use std::io::Cursor;

    fn repo() -> Repository {
        let dir = tempfile::tempdir().unwrap();
        // Leak the tempdir so it outlives the repository in these tests; cleanup()
        // removes the spool subdirectory it created within it regardless.
        let path = dir.into_path();
        Repository::new("test", path).unwrap()
    }

    #[test]
    fn add_event_rejects_duplicate_marks() {
        let mut repo = repo();
        repo.add_event(Event::Blob(Blob::new(Mark::new(1).unwrap(), b"a".to_vec()))).unwrap();
        let err = repo.add_event(Event::Blob(Blob::new(Mark::new(1).unwrap(), b"b".to_vec())));
        assert!(matches!(err, Err(RepositoryError::DuplicateMark(1))));
    }

    #[test]
    fn add_event_rejects_invalid_branch_refname() {
        let mut repo = repo();
        let c = Commit::new("refs//heads/master", Attribution::parse("A <a@example.com> 0 +0000").unwrap());
        let err = repo.add_event(Event::Commit(c));
        assert!(matches!(err, Err(RepositoryError::InvalidRefname(_, _))));
    }

    #[test]
    fn add_event_rejects_unresolved_parent() {
        let mut repo = repo();
        let mut c = Commit::new("refs/heads/master", Attribution::parse("A <a@example.com> 0 +0000").unwrap());
        c.mark = Mark::new(2);
        c.add_parent_by_mark(Mark::new(99).unwrap());
        let err = repo.add_event(Event::Commit(c));
        assert!(matches!(err, Err(RepositoryError::UnresolvedParent(99))));
    }

    #[test]
    fn event_to_index_finds_unmarked_events_by_identity() {
        let mut repo = repo();
        repo.add_event(Event::Reset(fast_export::model::Reset { branch: "refs/heads/master".into(), from: None })).unwrap();
        repo.add_event(Event::Passthrough(fast_export::model::Passthrough { text: "# note".into() })).unwrap();
        assert_eq!(repo.event_to_index(repo.event(0)), Some(0));
        assert_eq!(repo.event_to_index(repo.event(1)), Some(1));
    }

    #[test]
    fn done_passthrough_stays_last() {
        let mut repo = repo();
        repo.add_event(Event::Passthrough(fast_export::model::Passthrough { text: "done".into() })).unwrap();
        repo.add_event(Event::Blob(Blob::new(Mark::new(1).unwrap(), b"a".to_vec()))).unwrap();
        assert!(matches!(repo.event(1), Event::Passthrough(p) if p.is_done()));
    }

    #[test]
    fn ancestors_follows_parent_chain() {
        let mut repo = repo();
        let a = Attribution::parse("A <a@example.com> 0 +0000").unwrap();
        let mut c1 = Commit::new("refs/heads/master", a.clone());
        c1.mark = Mark::new(1);
        repo.add_event(Event::Commit(c1)).unwrap();
        let mut c2 = Commit::new("refs/heads/master", a);
        c2.mark = Mark::new(2);
        c2.add_parent_by_mark(Mark::new(1).unwrap());
        repo.add_event(Event::Commit(c2)).unwrap();
        assert_eq!(repo.ancestors(1), HashSet::from([0]));
    }

    #[test]
    fn fast_import_round_trips_through_size() {
        let mut repo = repo();
        let stream = b"blob\nmark :1\ndata 5\nhello\n";
        let mut cursor = Cursor::new(&stream[..]);
        repo.fast_import(&mut cursor).unwrap();
        assert_eq!(repo.size().unwrap(), stream.len() as u64);
    }

    #[test]
    fn manifest_composes_across_parents() {
        use fast_export::fileop::{BlobRef, FileMode, FileOp};

        let mut repo = repo();
        let a = Attribution::parse("A <a@example.com> 0 +0000").unwrap();
        repo.add_event(Event::Blob(Blob::new(Mark::new(1).unwrap(), b"one".to_vec()))).unwrap();
        repo.add_event(Event::Blob(Blob::new(Mark::new(2).unwrap(), b"two".to_vec()))).unwrap();

        let mut c1 = Commit::new("refs/heads/master", a.clone());
        c1.mark = Mark::new(10);
        c1.append_operation(FileOp::Modify { mode: FileMode::Regular, r#ref: BlobRef::Mark(1), path: "a.txt".into() });
        repo.add_event(Event::Commit(c1)).unwrap();

        let mut c2 = Commit::new("refs/heads/master", a);
        c2.mark = Mark::new(11);
        c2.add_parent_by_mark(Mark::new(10).unwrap());
        c2.append_operation(FileOp::Modify { mode: FileMode::Regular, r#ref: BlobRef::Mark(2), path: "b.txt".into() });
        repo.add_event(Event::Commit(c2)).unwrap();

        let manifest = repo.manifest(3);
        assert_eq!(manifest.get("a.txt"), Some(&(FileMode::Regular, BlobRef::Mark(1))));
        assert_eq!(manifest.get("b.txt"), Some(&(FileMode::Regular, BlobRef::Mark(2))));
        assert_eq!(repo.visible(3, "a.txt"), Some(BlobRef::Mark(1)));
        assert_eq!(repo.visible(3, "missing.txt"), None);
        assert!(repo.descended_from(3, 2));
        assert!(!repo.descended_from(2, 3));
    }

    #[test]
    fn large_blobs_are_spooled_on_insertion() {
        let mut repo = repo();
        let big = vec![b'x'; super::SPOOL_THRESHOLD + 1];
        repo.add_event(Event::Blob(Blob::new(Mark::new(1).unwrap(), big.clone()))).unwrap();
        match repo.event(0) {
            Event::Blob(b) => {
                assert!(b.spool_path().is_some());
                assert_eq!(b.get_content().unwrap(), big);
            }
            _ => panic!("expected blob"),
        }
    }

    #[test]
    fn tags_targeting_finds_tags_by_commit() {
        let mut repo = repo();
        let a = Attribution::parse("A <a@example.com> 0 +0000").unwrap();
        let mut c = Commit::new("refs/heads/master", a.clone());
        c.mark = Mark::new(1);
        repo.add_event(Event::Commit(c)).unwrap();
        repo.add_event(Event::Tag(Tag {
            mark: None,
            name: "v1".into(),
            committish: Commitish::Mark(Mark::new(1).unwrap()),
            tagger: Some(a),
            comment: String::new(),
        }))
        .unwrap();
        assert_eq!(repo.tags_targeting(0), vec![1]);
    }
}
