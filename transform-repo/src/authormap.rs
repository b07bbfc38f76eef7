//! Reading and writing the author-map file format:
//! `local = Fullname <email> [tz]`, with `+ Fullname <email> [tz]` continuation lines
//! registering aliases for the most recently defined local. Blank lines and `#` comments
//! are ignored.
//!

use std::collections::HashSet;
use std::io::{BufRead, Write};

use fast_export::attribution::{AuthorMap, Contributor};
use fast_export::model::Event;

use crate::error::RepositoryError;
use crate::repository::Repository;

/// Parses an author-map file from `r` into an [`AuthorMap`].
pub fn read_author_map<R: BufRead>(r: &mut R) -> Result<AuthorMap, RepositoryError> {
    let mut map = AuthorMap::new();
    let mut current_local: Option<String> = None;
    for line in r.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix('+') {
            let Some(local) = &current_local else { continue };
            if let Some(contributor) = parse_contributor(rest.trim()) {
                map.insert_local(local.clone(), contributor.clone());
                // An alias line keyed by the current local doubles as an alias entry so
                // lookups by the original (fullname, email) pair still resolve.
                map.insert_alias(contributor.fullname.clone(), contributor.email.clone(), contributor);
            }
            continue;
        }
        if let Some((local, rest)) = trimmed.split_once('=') {
            let local = local.trim().to_string();
            if let Some(contributor) = parse_contributor(rest.trim()) {
                map.insert_local(local.clone(), contributor);
            }
            current_local = Some(local);
        }
    }
    Ok(map)
}

fn parse_contributor(s: &str) -> Option<Contributor> {
    let open = s.find('<')?;
    let close = s[open..].find('>')? + open;
    let fullname = s[..open].trim().to_string();
    let email = s[open + 1..close].to_string();
    let rest = s[close + 1..].trim();
    let timezone = if rest.is_empty() { None } else { rest.parse::<chrono_tz::Tz>().ok() };
    Some(Contributor { fullname, email, timezone })
}

/// Writes every local-alias entry in `map` to `w`, one `local = Fullname <email> [tz]`
/// line per entry. Entries that were only partially resolved through the alias map are
/// still emitted verbatim rather than silently dropped, so a subsequent read can tell
/// which locals remain unresolved.
pub fn write_author_map<W: Write>(map: &AuthorMap, w: &mut W) -> std::io::Result<()> {
    for (local, contributor) in map.locals() {
        write_entry(w, local, contributor)?;
    }
    Ok(())
}

fn write_entry<W: Write>(w: &mut W, local: &str, contributor: &Contributor) -> std::io::Result<()> {
    match &contributor.timezone {
        Some(tz) => writeln!(w, "{local} = {} <{}> {tz}", contributor.fullname, contributor.email),
        None => writeln!(w, "{local} = {} <{}>", contributor.fullname, contributor.email),
    }
}

impl Repository {
    /// Reads an author map from `r` and applies it to the committer, author, and tagger
    /// attributions of every event at an index in `indices`. New entries are merged into
    /// the repository's own author map first, so later calls (and a subsequent
    /// [`Repository::write_author_map`]) see the union of everything read so far.
    pub fn read_author_map<R: BufRead>(&mut self, indices: &HashSet<usize>, r: &mut R) -> Result<(), RepositoryError> {
        let incoming = read_author_map(r)?;
        for (local, contributor) in incoming.locals() {
            self.author_map.insert_local(local, contributor.clone());
        }
        for ((fullname, email), contributor) in incoming.aliases() {
            self.author_map.insert_alias(fullname.clone(), email.clone(), contributor.clone());
        }
        let map = self.author_map.clone();
        for &i in indices {
            match &mut self.events_mut()[i] {
                Event::Commit(c) => {
                    c.committer = c.committer.remap(&map);
                    for author in c.authors.iter_mut() {
                        *author = author.remap(&map);
                    }
                }
                Event::Tag(t) => {
                    if let Some(tagger) = &t.tagger {
                        t.tagger = Some(tagger.remap(&map));
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Writes the local-alias entries referenced by the committer, author, and tagger
    /// attributions of every event at an index in `indices`. An attribution already
    /// resolved in the repository's author map is written under its resolved identity;
    /// one that isn't is written as-is, so the emitted file is a usable starting point for
    /// filling in the remaining unresolved locals.
    pub fn write_author_map<W: Write>(&self, indices: &HashSet<usize>, w: &mut W) -> std::io::Result<()> {
        let mut scoped = AuthorMap::new();
        for &i in indices {
            let Some(event) = self.events().get(i) else { continue };
            for attribution in event_attributions(event) {
                let local = attribution.email.to_lowercase();
                if scoped.get_local(&local).is_some() {
                    continue;
                }
                let contributor = self.author_map.get_local(&attribution.email).cloned().unwrap_or_else(|| Contributor {
                    fullname: attribution.fullname.clone(),
                    email: attribution.email.clone(),
                    timezone: None,
                });
                scoped.insert_local(local, contributor);
            }
        }
        write_author_map(&scoped, w)
    }
}

fn event_attributions(event: &Event) -> Vec<&fast_export::attribution::Attribution> {
    match event {
        Event::Commit(c) => {
            let mut v = vec![&c.committer];
            v.extend(c.authors.iter());
            v
        }
        Event::Tag(t) => t.tagger.iter().collect(),
        Event::Blob(_) | Event::Reset(_) | Event::Passthrough(_) => Vec::new(),
    }
}
