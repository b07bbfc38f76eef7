//! Dynamic, capitalized-name field access for the record types a command interface
//! edits, via a small per-record descriptor table rather than stringly-typed reflection.
//!

use fast_export::attribution::Attribution;
use fast_export::envelope::MessageBlock;
use fast_export::model::{Commit, Tag};

#[derive(Debug, thiserror::Error)]
pub enum ReflectError {
    #[error("no such field: {0}")]
    NoSuchField(String),
    #[error("field {0} is read-only")]
    ReadOnly(String),
    #[error("invalid value for field {0}: {1:?}")]
    InvalidValue(String, String),
}

/// Dynamic field access keyed by exported (capitalized) field name.
pub trait Reflect {
    fn get_attr(&self, field: &str) -> Result<String, ReflectError>;
    fn set_attr(&mut self, field: &str, value: &str) -> Result<(), ReflectError>;
}

/// A short integrity check printed alongside the full comment: the comment's first line,
/// used by a caller to notice if an edited envelope's headers and body have come apart
/// (e.g. lines shuffled by a careless hand edit).
fn check_text(comment: &str) -> &str {
    comment.lines().next().unwrap_or("")
}

fn format_person(attribution: &Attribution) -> String {
    let (name, email) = attribution.address();
    format!("{name} <{email}>")
}

/// Parses a `Name <email>` header value together with a separately-carried date header
/// back into a full [`Attribution`].
fn parse_person(person: &str, date: Option<&str>, fallback_date: &str) -> Option<Attribution> {
    let date = date.unwrap_or(fallback_date);
    Attribution::parse(&format!("{person} {date}")).ok()
}

/// Renders a commit as a [`MessageBlock`]: the full header set `emailOut` produces per the
/// message-block envelope format (`Event-Number`/`Event-Mark` identify the event,
/// `Parents` and `Check-Text` are read-only context, the rest round-trip through
/// [`email_in`]), plus the comment as the body.
pub fn email_out(index: usize, commit: &Commit) -> MessageBlock {
    let mut block = MessageBlock::new();
    block.set_header("Event-Number", (index + 1).to_string());
    if let Some(mark) = commit.mark {
        block.set_header("Event-Mark", mark.to_string());
    }
    block.set_header("Branch", commit.branch.clone());
    if !commit.parents.is_empty() {
        let parents = commit.parents.iter().map(ToString::to_string).collect::<Vec<_>>().join(" ");
        block.set_header("Parents", parents);
    }
    if let Some(author) = commit.authors.first() {
        block.set_header("Author", format_person(author));
        block.set_header("Author-Date", author.date.to_rfc3339());
    }
    block.set_header("Committer", format_person(&commit.committer));
    block.set_header("Committer-Date", commit.committer.date.to_rfc3339());
    block.set_header("Check-Text", check_text(&commit.comment));
    block.body = commit.comment.clone().into_bytes();
    block
}

/// Applies the editable headers and body of `msg` back onto `commit`. `Event-Number`,
/// `Event-Mark`, `Parents`, and `Check-Text` are read-only context and are ignored on the
/// way back in, along with any other unrecognized header, since a hand-edited envelope may
/// carry informational headers the command interface doesn't expect to apply back.
pub fn email_in(commit: &mut Commit, msg: &MessageBlock) {
    if let Some(branch) = msg.get_header("Branch") {
        commit.branch = branch.to_string();
    }
    if let Some(person) = msg.get_header("Author") {
        let fallback =
            commit.authors.first().unwrap_or(&commit.committer).date.to_rfc3339();
        if let Some(attribution) = parse_person(person, msg.get_header("Author-Date"), &fallback) {
            // The envelope exposes only a single editable Author header; a hand edit
            // replaces the whole authors list rather than just the first entry.
            commit.authors = vec![attribution];
        }
    }
    if let Some(person) = msg.get_header("Committer") {
        let fallback = commit.committer.date.to_rfc3339();
        if let Some(attribution) = parse_person(person, msg.get_header("Committer-Date"), &fallback) {
            commit.committer = attribution;
        }
    }
    commit.comment = String::from_utf8_lossy(&msg.body).into_owned();
}

/// Renders a tag as a [`MessageBlock`]: the full header set per the message-block envelope
/// format (`Event-Number`/`Event-Mark`/`Target-Mark` are read-only context), plus the
/// comment as the body. The inverse of [`tag_email_in`].
pub fn tag_email_out(index: usize, tag: &Tag) -> MessageBlock {
    let mut block = MessageBlock::new();
    block.set_header("Event-Number", (index + 1).to_string());
    if let Some(mark) = tag.mark {
        block.set_header("Event-Mark", mark.to_string());
    }
    block.set_header("Tag-Name", tag.name.clone());
    block.set_header("Target-Mark", tag.committish.to_string());
    if let Some(tagger) = &tag.tagger {
        block.set_header("Tagger", format_person(tagger));
        block.set_header("Tagger-Date", tagger.date.to_rfc3339());
    }
    block.set_header("Check-Text", check_text(&tag.comment));
    block.body = tag.comment.clone().into_bytes();
    block
}

/// Applies the editable headers and body of `msg` back onto `tag`.
pub fn tag_email_in(tag: &mut Tag, msg: &MessageBlock) {
    if let Some(name) = msg.get_header("Tag-Name") {
        tag.name = name.to_string();
    }
    if let Some(person) = msg.get_header("Tagger") {
        let fallback = tag.tagger.as_ref().map(|t| t.date.to_rfc3339()).unwrap_or_default();
        if let Some(attribution) = parse_person(person, msg.get_header("Tagger-Date"), &fallback) {
            tag.tagger = Some(attribution);
        }
    }
    tag.comment = String::from_utf8_lossy(&msg.body).into_owned();
}

impl Reflect for Commit {
    fn get_attr(&self, field: &str) -> Result<String, ReflectError> {
        match field {
            "Branch" => Ok(self.branch.clone()),
            "Mark" => Ok(self.mark.map(|m| m.to_string()).unwrap_or_default()),
            "Author" => Ok(self.authors.first().map(ToString::to_string).unwrap_or_default()),
            "Committer" => Ok(self.committer.to_string()),
            "Comment" => Ok(self.comment.clone()),
            _ => Err(ReflectError::NoSuchField(field.to_string())),
        }
    }

    fn set_attr(&mut self, field: &str, value: &str) -> Result<(), ReflectError> {
        match field {
            "Branch" => {
                self.branch = value.to_string();
                Ok(())
            }
            "Committer" => {
                self.committer = fast_export::attribution::Attribution::parse(value)
                    .map_err(|_| ReflectError::InvalidValue(field.to_string(), value.to_string()))?;
                Ok(())
            }
            "Author" => {
                self.authors = vec![
                    fast_export::attribution::Attribution::parse(value)
                        .map_err(|_| ReflectError::InvalidValue(field.to_string(), value.to_string()))?,
                ];
                Ok(())
            }
            "Comment" => {
                self.comment = value.to_string();
                Ok(())
            }
            "Mark" => Err(ReflectError::ReadOnly(field.to_string())),
            _ => Err(ReflectError::NoSuchField(field.to_string())),
        }
    }
}

impl Reflect for Tag {
    fn get_attr(&self, field: &str) -> Result<String, ReflectError> {
        match field {
            "Tag-Name" => Ok(self.name.clone()),
            "Target-Mark" => Ok(self.committish.to_string()),
            "Tagger" => Ok(self.tagger.as_ref().map(ToString::to_string).unwrap_or_default()),
            "Comment" => Ok(self.comment.clone()),
            _ => Err(ReflectError::NoSuchField(field.to_string())),
        }
    }

    fn set_attr(&mut self, field: &str, value: &str) -> Result<(), ReflectError> {
        match field {
            "Tag-Name" => {
                self.name = value.to_string();
                Ok(())
            }
            "Tagger" => {
                self.tagger = Some(
                    fast_export::attribution::Attribution::parse(value)
                        .map_err(|_| ReflectError::InvalidValue(field.to_string(), value.to_string()))?,
                );
                Ok(())
            }
            "Comment" => {
                self.comment = value.to_string();
                Ok(())
            }
            "Target-Mark" => Err(ReflectError::ReadOnly(field.to_string())),
            _ => Err(ReflectError::NoSuchField(field.to_string())),
        }
    }
}
