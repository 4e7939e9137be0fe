//! One handler per subcommand.
//!
//! Handlers return data; printing is left to the binary.

use crate::change_ref::ChangeReference;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::format::ChangesetRow;
use crate::gerrit::{ChangesetRecord, GerritClient};
use crate::git::{Git, FETCH_HEAD};
use crate::reset::{resolve_change_ref, ResetPlan, ResetSafetyChecker};
use crate::runner::Runner;
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use tracing::{debug, info};

/// Everything a handler needs for one run.
pub struct Context<'a> {
    /// Resolved configuration.
    pub config: &'a Config,
    runner: &'a dyn Runner,
    git: Git<'a>,
    gerrit: GerritClient<'a>,
}

impl<'a> Context<'a> {
    /// Bind `config` to a process runner.
    #[must_use]
    pub fn new(config: &'a Config, runner: &'a dyn Runner) -> Self {
        Self {
            config,
            runner,
            git: Git::new(runner),
            gerrit: GerritClient::new(runner, config),
        }
    }
}

/// Parameters for [`list`].
#[derive(Debug, Clone, Default)]
pub struct ListParams {
    /// Regexes matched against subject or topic; any match keeps a change.
    pub patterns: Vec<String>,
    /// Include closed changes.
    pub all: bool,
}

/// Compile a `list` pattern; it is case-insensitive unless it has an
/// uppercase letter.
///
/// # Errors
///
/// [`Error::InvalidPattern`] for an invalid regex.
pub fn compile_pattern(pattern: &str) -> Result<Regex> {
    let insensitive = !pattern.chars().any(char::is_uppercase);
    RegexBuilder::new(pattern)
        .case_insensitive(insensitive)
        .build()
        .map_err(|source| Error::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })
}

/// Keep rows whose subject or topic matches any of `patterns`; all rows
/// when there are none.
#[must_use]
pub fn filter_rows(rows: Vec<ChangesetRow>, patterns: &[Regex]) -> Vec<ChangesetRow> {
    if patterns.is_empty() {
        return rows;
    }
    rows.into_iter()
        .filter(|row| {
            patterns.iter().any(|pattern| {
                pattern.is_match(&row.subject)
                    || row.topic.as_deref().is_some_and(|topic| pattern.is_match(topic))
            })
        })
        .collect()
}

/// `list`: changesets of the configured project.
///
/// # Errors
///
/// [`Error::InvalidPattern`], [`Error::MissingProject`] and query errors.
pub fn list(ctx: &Context<'_>, params: &ListParams) -> Result<Vec<ChangesetRow>> {
    let patterns = params
        .patterns
        .iter()
        .map(String::as_str)
        .map(compile_pattern)
        .collect::<Result<Vec<_>>>()?;

    let project = ctx.config.require_project(&ctx.gerrit)?;
    let mut criteria = vec![format!("project:{project}")];
    if !params.all {
        criteria.push("status:open".to_string());
    }

    let rows = ctx
        .gerrit
        .query(&criteria)?
        .iter()
        .map(ChangesetRow::from_record)
        .collect();
    Ok(filter_rows(rows, &patterns))
}

/// Result of [`fetch`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchResult {
    /// Change number.
    pub change: String,
    /// Patchset fetched.
    pub patchset: u32,
    /// Ref fetched.
    #[serde(rename = "ref")]
    pub ref_name: String,
    /// Where git put it.
    pub target: String,
}

/// `fetch`: fetch a changeset's patchset into `FETCH_HEAD`.
///
/// # Errors
///
/// [`Error::InvalidFormat`] before anything runs for a malformed token or,
/// after the lookup, for a patchset newer than the current one.
pub fn fetch(ctx: &Context<'_>, changeset: &str) -> Result<FetchResult> {
    let reference = ChangeReference::parse(changeset)?;
    let project = ctx.config.lookup_project(&ctx.gerrit)?;
    let (patchset, ref_name) = resolve_change_ref(&ctx.gerrit, &reference, project.as_deref())?;
    ctx.git.fetch_ref(&ctx.config.remote, &ref_name)?;
    info!(%ref_name, "fetched");
    Ok(FetchResult {
        change: reference.change_number().to_string(),
        patchset,
        ref_name,
        target: FETCH_HEAD.to_string(),
    })
}

/// `reset-to`: safety-checked hard reset to a branch or changeset.
///
/// # Errors
///
/// See [`ResetSafetyChecker::reset_to`].
pub fn reset_to(ctx: &Context<'_>, target: &str) -> Result<ResetPlan> {
    ResetSafetyChecker::new(&ctx.git, &ctx.gerrit, ctx.config).reset_to(target)
}

/// Parameters for [`open`].
#[derive(Debug, Clone, Default)]
pub struct OpenParams {
    /// Ref path, number or commit id; `None` means `HEAD`.
    pub changeset: Option<String>,
    /// Program to open the URL with.
    pub open_with: Option<String>,
}

/// Result of [`open`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpenResult {
    /// URL handed to the opener.
    pub url: String,
    /// Program that was run.
    pub opener: String,
}

/// The platform's URL opener.
#[must_use]
pub const fn default_opener() -> &'static str {
    if cfg!(target_os = "macos") {
        "open"
    } else {
        "xdg-open"
    }
}

fn is_commit_like(token: &str) -> bool {
    token.len() >= 4 && token.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Find the web URL for a changeset token or, with no token, for `HEAD`.
///
/// # Errors
///
/// [`Error::NotFound`] when neither a change nor a commit matches, or the
/// parse error for a token that is neither.
pub fn resolve_url(ctx: &Context<'_>, changeset: Option<&str>) -> Result<String> {
    let Some(token) = changeset else {
        let head = ctx.git.head()?;
        let record = lookup(ctx, &format!("commit:{head}"), true)?;
        return Ok(record_url(&record, None));
    };

    let parsed = ChangeReference::parse(token);
    if let Ok(reference) = &parsed {
        let criteria = format!("change:{}", reference.change_number());
        if let Some(record) = lookup_optional(ctx, &criteria)? {
            return Ok(record_url(&record, reference.patchset()));
        }
        debug!(%token, "not a change number here, trying as a commit");
    }

    if is_commit_like(token) {
        let record = lookup(ctx, &format!("commit:{token}"), true)?;
        return Ok(record_url(&record, None));
    }

    match parsed {
        Ok(_) => Err(Error::NotFound {
            query: format!("change:{token}"),
        }),
        Err(err) => Err(err),
    }
}

fn lookup(ctx: &Context<'_>, criteria: &str, strict: bool) -> Result<ChangesetRecord> {
    ctx.gerrit
        .query_one(&[criteria], None, strict)?
        .ok_or_else(|| Error::NotFound {
            query: criteria.to_string(),
        })
}

fn lookup_optional(ctx: &Context<'_>, criteria: &str) -> Result<Option<ChangesetRecord>> {
    ctx.gerrit.query_one(&[criteria], None, false)
}

fn record_url(record: &ChangesetRecord, patchset: Option<u32>) -> String {
    match patchset {
        Some(patchset) => format!("{}/{patchset}", record.url.trim_end_matches('/')),
        None => record.url.clone(),
    }
}

/// `open`: resolve a URL and launch the opener on it.
///
/// # Errors
///
/// Lookup errors from [`resolve_url`] and transport errors from the opener.
pub fn open(ctx: &Context<'_>, params: &OpenParams) -> Result<OpenResult> {
    let url = resolve_url(ctx, params.changeset.as_deref())?;
    let opener = params
        .open_with
        .clone()
        .unwrap_or_else(|| default_opener().to_string());
    ctx.runner.run(&opener, &[url.as_str()])?;
    Ok(OpenResult { url, opener })
}

/// Parameters for [`spam`].
#[derive(Debug, Clone, Default)]
pub struct SpamParams {
    /// Changeset tokens; `NNNN/PP` pins a patchset.
    pub changesets: Vec<String>,
    /// Review comment posted to each.
    pub message: String,
}

/// One comment posted by [`spam`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpamResult {
    /// Change number.
    pub change: String,
    /// Patchset commented on.
    pub patchset: u32,
    /// Commit id commented on.
    pub revision: String,
}

/// `spam`: post the same comment on several changesets.
///
/// Every target is parsed, then every target is looked up and checked,
/// and only then are comments posted, in order. A failed post stops the
/// run; comments already posted stay.
///
/// # Errors
///
/// [`Error::InvalidFormat`], [`Error::StalePatchset`], lookup and transport
/// errors.
pub fn spam(ctx: &Context<'_>, params: &SpamParams) -> Result<Vec<SpamResult>> {
    let references = params
        .changesets
        .iter()
        .map(String::as_str)
        .map(ChangeReference::parse_target)
        .collect::<Result<Vec<_>>>()?;

    let project = ctx.config.lookup_project(&ctx.gerrit)?;
    let mut planned = Vec::with_capacity(references.len());
    for reference in &references {
        let criteria = [format!("change:{}", reference.change_number())];
        let record = ctx
            .gerrit
            .query_one(&criteria, project.as_deref(), true)?
            .ok_or_else(|| Error::NotFound {
                query: criteria.join(" "),
            })?;
        let current = record.current_patch_set.number;
        if let Some(requested) = reference.patchset() {
            if requested != current {
                return Err(Error::StalePatchset {
                    change: reference.change_number().to_string(),
                    requested,
                    current,
                });
            }
        }
        planned.push(SpamResult {
            change: record.number,
            patchset: current,
            revision: record.current_patch_set.revision,
        });
    }

    for target in &planned {
        ctx.gerrit.review(&target.revision, &params.message)?;
    }
    Ok(planned)
}

/// `ls-projects`: projects containing any of `substrings`.
///
/// # Errors
///
/// Transport errors from `ssh`.
pub fn ls_projects(ctx: &Context<'_>, substrings: &[String]) -> Result<Vec<String>> {
    let projects = ctx.gerrit.ls_projects()?;
    if substrings.is_empty() {
        return Ok(projects);
    }
    Ok(projects
        .into_iter()
        .filter(|project| substrings.iter().any(|s| project.contains(s.as_str())))
        .collect())
}

/// `dump-config`: the resolved configuration.
#[must_use]
pub fn dump_config(ctx: &Context<'_>) -> Config {
    ctx.config.clone()
}
