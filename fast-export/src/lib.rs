// Copyright (C) Thalia Archibald. All rights reserved.
//
// This file is part of fast-export-rust, distributed under the GPL 2.0 with a
// linking exception. For the full terms, see the included COPYING file.

//! Format-level core of a version-control repository surgery tool: the event model
//! (blobs, commits, tags, resets, passthroughs), the fast-import parser and emitter, and
//! the supporting types (dates, attributions, file operations, the message-block
//! envelope) they are built from.
//!
//! This crate knows about a single stream or a single record at a time; it has no notion
//! of "repository" beyond the [`Mark`](model::Mark) cross-references a caller uses to
//! assemble a graph on top (see the `transform-repo` crate for that layer).

pub mod attribution;
pub mod baton;
pub mod containers;
pub mod date;
pub mod envelope;
pub mod error;
pub mod export;
pub mod fileop;
pub mod import;
pub mod intern;
pub mod model;
pub mod quoting;
pub mod refs;

pub use attribution::{Attribution, AuthorMap, Contributor};
pub use baton::Baton;
pub use date::Date;
pub use error::{ExportError, ParseError, ParseErrorKind, StreamError};
pub use fileop::FileOp;
pub use model::{Blob, Commit, Commitish, Event, Mark, Passthrough, Reset, Tag};
