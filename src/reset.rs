//! Safety-checked `git reset --hard`.
//!
//! The checks run strictly in [`ResetStage`] order. Every stage before
//! [`ResetStage::Mutate`] only reads the repository (or refreshes
//! remote-tracking refs and `FETCH_HEAD`), so a failure anywhere leaves the
//! working tree and branch untouched.

use crate::change_ref::{ChangeReference, REF_PREFIX};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::gerrit::GerritClient;
use crate::git::{Git, FETCH_HEAD};
use serde::Serialize;
use std::fmt;
use tracing::{debug, info};

/// The states of the reset procedure, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetStage {
    /// The working tree must have no local modifications.
    CleanCheck,
    /// HEAD must already be on the review server or upstream.
    UploadedCheck,
    /// Decide whether the target is a branch or a changeset.
    TargetClassify,
    /// Fetch whatever the target names.
    Resolve,
    /// `git reset --hard`.
    Mutate,
}

impl fmt::Display for ResetStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CleanCheck => "clean-check",
            Self::UploadedCheck => "uploaded-check",
            Self::TargetClassify => "target-classify",
            Self::Resolve => "resolve",
            Self::Mutate => "mutate",
        };
        f.write_str(name)
    }
}

/// What the branch will be reset to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResetPlan {
    /// The tip of a remote branch, e.g. `origin/main`.
    Branch {
        /// Remote-qualified branch name.
        remote_branch: String,
    },
    /// A changeset patchset fetched into `FETCH_HEAD`.
    Change {
        /// Change number.
        change: String,
        /// Patchset that was fetched.
        patchset: u32,
        /// The fetched ref.
        #[serde(rename = "ref")]
        ref_name: String,
        /// Fetch marker the reset points at.
        target: String,
    },
}

impl ResetPlan {
    /// The revision handed to `git reset --hard`.
    #[must_use]
    pub fn target(&self) -> &str {
        match self {
            Self::Branch { remote_branch } => remote_branch,
            Self::Change { target, .. } => target,
        }
    }
}

impl fmt::Display for ResetPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Branch { remote_branch } => f.write_str(remote_branch),
            Self::Change {
                change,
                patchset,
                ref_name,
                ..
            } => write!(f, "change {change} patchset {patchset} ({ref_name})"),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Target<'t> {
    Branch(&'t str),
    Change(&'t str),
}

/// Runs the reset stages against one repository and review server.
pub struct ResetSafetyChecker<'c> {
    git: &'c Git<'c>,
    gerrit: &'c GerritClient<'c>,
    config: &'c Config,
}

impl<'c> ResetSafetyChecker<'c> {
    /// Checker for the current repository. The configured project, when it
    /// resolves, is enforced on changeset targets.
    #[must_use]
    pub const fn new(git: &'c Git<'c>, gerrit: &'c GerritClient<'c>, config: &'c Config) -> Self {
        Self {
            git,
            gerrit,
            config,
        }
    }

    /// Run every stage and reset the current branch to `target`.
    ///
    /// # Errors
    ///
    /// [`Error::UncleanTree`], [`Error::NotUploaded`], [`Error::InvalidFormat`]
    /// and lookup/transport errors; all of them before any mutation except a
    /// transport error from the final reset itself.
    pub fn reset_to(&self, target: &str) -> Result<ResetPlan> {
        self.enter(ResetStage::CleanCheck);
        self.check_clean()?;

        self.enter(ResetStage::UploadedCheck);
        self.check_uploaded()?;

        self.enter(ResetStage::TargetClassify);
        let target = self.classify(target)?;

        self.enter(ResetStage::Resolve);
        let plan = self.resolve(&target)?;

        self.enter(ResetStage::Mutate);
        self.git.reset_hard(plan.target())?;
        info!(%plan, "reset complete");
        Ok(plan)
    }

    #[allow(clippy::unused_self)]
    fn enter(&self, stage: ResetStage) {
        debug!(%stage, "reset stage");
    }

    fn check_clean(&self) -> Result<()> {
        let status = self.git.status_porcelain()?;
        if status.is_empty() {
            Ok(())
        } else {
            Err(Error::UncleanTree { status })
        }
    }

    fn check_uploaded(&self) -> Result<()> {
        let head = self.git.head()?;

        let known = self.gerrit.query(&[format!("commit:{head}")])?;
        if !known.is_empty() {
            debug!(%head, "HEAD is a known changeset");
            return Ok(());
        }

        // Exact match or ancestor of the upstream tip.
        match self.upstream_merge_base(&head) {
            Ok(base) if base == head => {
                debug!(%head, "HEAD is contained in upstream");
                Ok(())
            }
            Ok(base) => {
                debug!(%head, %base, "HEAD diverges from upstream");
                Err(Error::NotUploaded { head })
            }
            Err(err) => {
                debug!(%head, "upstream comparison failed: {err}");
                Err(Error::NotUploaded { head })
            }
        }
    }

    fn upstream_merge_base(&self, head: &str) -> Result<String> {
        let branch = self.git.current_branch()?;
        self.git.fetch_ref(&self.config.remote, &branch)?;
        self.git.merge_base(head, FETCH_HEAD)
    }

    fn classify<'t>(&self, target: &'t str) -> Result<Target<'t>> {
        if target.contains(self.config.host.as_str()) || target.starts_with(REF_PREFIX) {
            return Ok(Target::Change(target));
        }
        if self.git.remote_has_branch(&self.config.remote, target)? {
            return Ok(Target::Branch(target));
        }
        Ok(Target::Change(target))
    }

    fn resolve(&self, target: &Target<'_>) -> Result<ResetPlan> {
        match *target {
            Target::Branch(branch) => {
                self.git.fetch_remote(&self.config.remote)?;
                Ok(ResetPlan::Branch {
                    remote_branch: format!("{}/{branch}", self.config.remote),
                })
            }
            Target::Change(token) => {
                let reference = ChangeReference::parse(token)?;
                let project = self.config.lookup_project(self.gerrit)?;
                let (patchset, ref_name) =
                    resolve_change_ref(self.gerrit, &reference, project.as_deref())?;
                self.git.fetch_ref(&self.config.remote, &ref_name)?;
                Ok(ResetPlan::Change {
                    change: reference.change_number().to_string(),
                    patchset,
                    ref_name,
                    target: FETCH_HEAD.to_string(),
                })
            }
        }
    }
}

/// Look up a change's current patchset and pick the ref to fetch.
///
/// # Errors
///
/// [`Error::NotFound`], [`Error::ProjectMismatch`], and
/// [`Error::InvalidFormat`] when the requested patchset is newer than the
/// current one.
pub fn resolve_change_ref(
    gerrit: &GerritClient<'_>,
    reference: &ChangeReference,
    project: Option<&str>,
) -> Result<(u32, String)> {
    let criteria = [format!("change:{}", reference.change_number())];
    let record = gerrit
        .query_one(&criteria, project, true)?
        .ok_or_else(|| Error::NotFound {
            query: criteria.join(" "),
        })?;
    let patchset = reference.resolve_patchset(record.current_patch_set.number)?;
    Ok((patchset, reference.ref_name(patchset)))
}
