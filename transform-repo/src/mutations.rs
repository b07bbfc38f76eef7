//! Structural mutations over a [`Repository`]: delete (with reference healing),
//! renumber, uniqueness checking, partial export, and resort.
//!

use std::collections::{HashMap, HashSet};

use fast_export::fileop::{BlobRef, FileOp};
use fast_export::model::{Commitish, Event, Mark, Passthrough};
use fast_export::Baton;

use crate::error::MutationError;
use crate::repository::Repository;

/// Checked once per unit of work inside a batonable mutation's main loop.
fn check_in(baton: Option<&Baton>) -> Result<(), MutationError> {
    if baton.is_some_and(Baton::is_cancelled) {
        return Err(MutationError::Cancelled);
    }
    Ok(())
}

/// The verdict [`Repository::check_uniqueness`] returns: which key, if any, uniquely
/// identifies every commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Uniqueness {
    CommitterDate,
    CommitterStamp,
    None,
}

impl Repository {
    /// Removes every event at an index in `indices`. Children of a removed commit
    /// inherit its parents in place (preserving order, de-duplicating); tags targeting a
    /// removed commit are retargeted to its first surviving ancestor, or dropped if none
    /// remains; blobs that become unreferenced are garbage-collected.
    ///
    /// `baton`, if given, is checked once before any mutation begins: a cancellation
    /// requested beforehand leaves the repository untouched. Deletion itself is not
    /// interrupted partway through, since its reference-healing pass isn't cheaply
    /// resumable once started.
    pub fn delete(&mut self, indices: &HashSet<usize>, baton: Option<&Baton>) -> Result<(), MutationError> {
        check_in(baton)?;
        let mut replacement: HashMap<u64, Vec<Commitish>> = HashMap::new();
        for &i in indices {
            if let Event::Commit(c) = &self.event(i) {
                if let Some(mark) = c.mark {
                    replacement.insert(mark.get(), c.parents.clone());
                }
            }
        }

        for i in self.all().collect::<Vec<_>>() {
            if indices.contains(&i) {
                continue;
            }
            let resolved = match &self.events()[i] {
                Event::Commit(c) => {
                    let resolved = resolve_parents(&c.parents, &replacement);
                    (resolved != c.parents).then_some(resolved)
                }
                _ => None,
            };
            if let Some(resolved) = resolved {
                if let Event::Commit(c) = &mut self.events_mut()[i] {
                    c.parents = resolved;
                }
            }
        }

        let mut to_remove = indices.clone();
        for i in self.all().collect::<Vec<_>>() {
            if indices.contains(&i) {
                continue;
            }
            let retarget = if let Event::Tag(t) = &self.events()[i] {
                match &t.committish {
                    Commitish::Mark(m) if replacement.contains_key(&m.get()) => {
                        let resolved = resolve_parents(&replacement[&m.get()], &replacement);
                        Some(resolved.first().cloned())
                    }
                    _ => None,
                }
            } else {
                None
            };
            match retarget {
                Some(Some(new_target)) => {
                    if let Event::Tag(t) = &mut self.events_mut()[i] {
                        t.committish = new_target;
                    }
                }
                Some(None) => {
                    to_remove.insert(i);
                }
                None => {}
            }
        }

        let mut sorted: Vec<usize> = to_remove.into_iter().collect();
        sorted.sort_unstable_by(|a, b| b.cmp(a));
        for i in sorted {
            self.events_mut().remove(i);
        }

        gc_unreferenced_blobs(self);
        self.rebuild_mark_index();
        Ok(())
    }

    /// Reassigns marks contiguously beginning at `start`, in event order, updating every
    /// cross-reference. Relative event order is unchanged. Idempotent: calling
    /// `renumber(1)` twice in a row has no effect on the emitted stream beyond the first
    /// call.
    ///
    /// `baton`, if given and already cancelled, leaves the repository untouched and
    /// reports [`MutationError::Cancelled`]; renumbering is transactional, so there is no
    /// partially-renumbered state to observe.
    pub fn renumber(&mut self, start: u64, baton: Option<&Baton>) -> Result<(), MutationError> {
        check_in(baton)?;
        let mut mapping: HashMap<u64, u64> = HashMap::new();
        let mut next = start;
        for event in self.events() {
            if let Some(mark) = event.mark() {
                mapping.insert(mark.get(), next);
                next += 1;
            }
        }
        for event in self.events_mut() {
            match event {
                Event::Blob(b) => b.mark = Mark::new(mapping[&b.mark.get()]).expect("mapping target is never 0"),
                Event::Commit(c) => {
                    if let Some(m) = c.mark {
                        c.mark = Mark::new(mapping[&m.get()]);
                    }
                    for p in c.parents.iter_mut() {
                        remap_commitish(p, &mapping);
                    }
                    for op in c.file_operations.iter_mut() {
                        remap_fileop_ref(op, &mapping);
                    }
                }
                Event::Tag(t) => {
                    if let Some(m) = t.mark {
                        t.mark = Mark::new(mapping[&m.get()]);
                    }
                    remap_commitish(&mut t.committish, &mapping);
                }
                Event::Reset(r) => {
                    if let Some(from) = r.from.as_mut() {
                        remap_commitish(from, &mapping);
                    }
                }
                Event::Passthrough(_) => {}
            }
        }
        self.rebuild_mark_index();
        Ok(())
    }

    /// Whether committer date alone, or (committer date, comment) together, uniquely
    /// identifies every commit. `strict` disables the comment-assisted fallback: a strict
    /// check only ever returns `CommitterDate` or `None`, since accepting a tie broken by
    /// comment text is itself the lenient behavior.
    pub fn check_uniqueness(&self, strict: bool) -> Uniqueness {
        let mut by_date: HashMap<String, u32> = HashMap::new();
        let mut by_stamp: HashMap<(String, String), u32> = HashMap::new();
        for (_, c) in self.commits() {
            *by_date.entry(c.committer.date.to_dump()).or_insert(0) += 1;
            *by_stamp.entry((c.committer.date.to_dump(), c.comment.clone())).or_insert(0) += 1;
        }
        let verdict = if by_date.values().all(|&n| n == 1) {
            Uniqueness::CommitterDate
        } else if !strict && by_stamp.values().all(|&n| n == 1) {
            Uniqueness::CommitterStamp
        } else {
            Uniqueness::None
        };
        tracing::info!(?verdict, strict, "checked commit uniqueness");
        verdict
    }

    /// Emits only the events at `indices` plus their prerequisite blobs, a synthetic
    /// `reset <branch>^0` in place of an omitted `from`, and any tags targeting an
    /// exported commit.
    pub fn partial_export(&self, indices: &HashSet<usize>) -> Vec<Event> {
        let mut sorted: Vec<usize> = indices.iter().copied().collect();
        sorted.sort_unstable();

        let mut out = Vec::new();
        let mut included_blobs: HashSet<u64> = HashSet::new();
        for &i in &sorted {
            if let Event::Commit(c) = &self.events()[i] {
                for op in &c.file_operations {
                    if let FileOp::Modify { r#ref: BlobRef::Mark(m), .. } | FileOp::Note { r#ref: BlobRef::Mark(m), .. } = op {
                        if included_blobs.insert(*m) {
                            if let Some(mark) = Mark::new(*m) {
                                if let Some(Event::Blob(b)) = self.mark_to_event(mark) {
                                    out.push(Event::Blob(b.clone()));
                                }
                            }
                        }
                    }
                }
            }
        }

        for &i in &sorted {
            match &self.events()[i] {
                Event::Commit(c) => {
                    let mut commit = c.clone();
                    let first_parent_included = c.parents.first().is_some_and(|p| match p {
                        Commitish::Mark(m) => sorted.iter().any(|&j| self.events()[j].mark().map(Mark::get) == Some(m.get())),
                        Commitish::Oid(_) => false,
                    });
                    if !c.parents.is_empty() && !first_parent_included {
                        out.push(Event::Passthrough(Passthrough { text: format!("reset {}^0", c.branch) }));
                        commit.parents.clear();
                    }
                    out.push(Event::Commit(commit));
                }
                Event::Tag(_) => {} // handled in the pass below
                other => out.push(other.clone()),
            }
        }

        for (_, t) in self.tags() {
            if let Commitish::Mark(m) = &t.committish {
                let target_exported = sorted.iter().any(|&j| self.events()[j].mark().map(Mark::get) == Some(m.get()));
                if target_exported {
                    out.push(Event::Tag(t.clone()));
                }
            }
        }

        out
    }

    /// Restores stream order by `(committer date, original index)`, then repairs
    /// forward until no commit precedes a parent it references by mark. The original
    /// index is only a tie-break for equal dates; the repair pass is what guarantees
    /// parent-before-child when dates and topology disagree.
    pub fn resort(&mut self) {
        let commit_slots: Vec<usize> =
            self.all().filter(|&i| matches!(self.event(i), Event::Commit(_))).collect();
        if commit_slots.is_empty() {
            return;
        }

        let mut commits: Vec<fast_export::model::Commit> = commit_slots
            .iter()
            .map(|&i| match self.event(i) {
                Event::Commit(c) => c.clone(),
                _ => unreachable!(),
            })
            .collect();

        commits.sort_by(|a, b| a.committer.date.instant().cmp(&b.committer.date.instant()));

        let mark_pos = |commits: &[fast_export::model::Commit], mark: u64| {
            commits.iter().position(|c| c.mark.map(Mark::get) == Some(mark))
        };
        let max_iterations = commits.len() * commits.len() + 1;
        for _ in 0..max_iterations {
            let mut moved = false;
            for idx in 0..commits.len() {
                let mut furthest_parent = None;
                for parent in &commits[idx].parents {
                    if let Commitish::Mark(m) = parent {
                        if let Some(ppos) = mark_pos(&commits, m.get()) {
                            furthest_parent = Some(furthest_parent.map_or(ppos, |fp: usize| fp.max(ppos)));
                        }
                    }
                }
                if let Some(ppos) = furthest_parent {
                    if ppos > idx {
                        let commit = commits.remove(idx);
                        commits.insert(ppos, commit);
                        moved = true;
                        break;
                    }
                }
            }
            if !moved {
                break;
            }
        }

        for (&slot, commit) in commit_slots.iter().zip(commits) {
            self.events_mut()[slot] = Event::Commit(commit);
        }
        self.rebuild_mark_index();
    }
}

fn resolve_parents(parents: &[Commitish], replacement: &HashMap<u64, Vec<Commitish>>) -> Vec<Commitish> {
    fn go(parents: &[Commitish], replacement: &HashMap<u64, Vec<Commitish>>, depth: usize, out: &mut Vec<Commitish>) {
        if depth > replacement.len() + 1 {
            for p in parents {
                if !out.contains(p) {
                    out.push(p.clone());
                }
            }
            return;
        }
        for p in parents {
            match p {
                Commitish::Mark(m) if replacement.contains_key(&m.get()) => {
                    go(&replacement[&m.get()], replacement, depth + 1, out);
                }
                other => {
                    if !out.contains(other) {
                        out.push(other.clone());
                    }
                }
            }
        }
    }
    let mut out = Vec::new();
    go(parents, replacement, 0, &mut out);
    out
}

fn remap_commitish(c: &mut Commitish, mapping: &HashMap<u64, u64>) {
    if let Commitish::Mark(m) = c {
        if let Some(&new) = mapping.get(&m.get()) {
            *m = Mark::new(new).expect("mapping target is never 0");
        }
    }
}

fn remap_fileop_ref(op: &mut FileOp, mapping: &HashMap<u64, u64>) {
    let r#ref = match op {
        FileOp::Modify { r#ref, .. } | FileOp::Note { r#ref, .. } => Some(r#ref),
        _ => None,
    };
    if let Some(BlobRef::Mark(m)) = r#ref {
        if let Some(&new) = mapping.get(m) {
            *m = new;
        }
    }
}

fn gc_unreferenced_blobs(repo: &mut Repository) {
    let mut referenced = HashSet::new();
    for (_, c) in repo.commits() {
        for op in &c.file_operations {
            if let FileOp::Modify { r#ref: BlobRef::Mark(m), .. } | FileOp::Note { r#ref: BlobRef::Mark(m), .. } = op {
                referenced.insert(*m);
            }
        }
    }
    let mut i = 0;
    while i < repo.events().len() {
        let should_remove = matches!(&repo.events()[i], Event::Blob(b) if !referenced.contains(&b.mark.get()));
        if should_remove {
            if let Event::Blob(b) = &repo.events()[i] {
                if let Some(path) = b.spool_path() {
                    let _ = std::fs::remove_file(path);
                }
            }
            repo.events_mut().remove(i);
            continue;
        }
        i += 1;
    }
}
