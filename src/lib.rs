//! `grh` is a small library backing the `grh` CLI binary.
//!
//! It wraps Gerrit's SSH query interface and the local `git` client:
//! - Parsing and formatting of changeset references (`refs/changes/XX/NNNN/PP`)
//! - A query client for `gerrit query` / `gerrit review` / `gerrit ls-projects`
//! - Display formatting for changeset listings
//! - A safety-checked `git reset --hard` procedure
//! - One handler per CLI subcommand

/// Changeset reference parsing and ref-path formatting.
pub mod change_ref;
/// Subcommand handlers composing the other modules.
pub mod commands;
/// Explicit configuration resolution (flags, git remote, git config).
pub mod config;
/// Closed error type shared by every module.
pub mod error;
/// Display formatting for changeset records.
pub mod format;
/// Gerrit SSH query client and record schema.
pub mod gerrit;
/// Typed wrappers over the `git` invocations this tool performs.
pub mod git;
/// Precondition chain run before a destructive reset.
pub mod reset;
/// External process invocation seam.
pub mod runner;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
