// Copyright (C) Thalia Archibald. All rights reserved.
//
// This file is part of git-transform-repo, distributed under the GPL 2.0 with a
// linking exception. For the full terms, see the included COPYING file.

//! Repository-surgery layer built on top of `fast_export`: a mutable, invariant-checked
//! event graph ([`Repository`]), structural mutations (delete, renumber, uniqueness
//! checking, partial export, resort), author-map resolution, the blob spool directory,
//! the VCS reference probe, and dynamic field access for a command interface.

pub mod authormap;
pub mod error;
pub mod mutations;
pub mod reflect;
pub mod repository;
pub mod spool;
pub mod vcs;

pub use error::{MutationError, RepositoryError};
pub use mutations::Uniqueness;
pub use reflect::Reflect;
pub use repository::Repository;
