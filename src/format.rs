//! Display fields for `list` output.

use crate::gerrit::{Approval, ChangesetRecord};
use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use std::io::IsTerminal;

/// When to emit ANSI colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ColorChoice {
    /// Colour when stdout is a terminal and `NO_COLOR` is unset.
    #[default]
    Auto,
    /// Never colour.
    Never,
    /// Always colour.
    Always,
}

impl ColorChoice {
    /// Whether output should be coloured.
    #[must_use]
    pub fn enabled(self) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Auto => {
                std::env::var_os("NO_COLOR").is_none() && std::io::stdout().is_terminal()
            }
        }
    }
}

/// One formatted vote: `C-1 carol`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApprovalView {
    /// Single-letter label code.
    pub label: String,
    /// Signed value, always with a leading sign.
    pub value: String,
    /// Reviewer handle, falling back to their email.
    pub reviewer: String,
    #[serde(skip)]
    positive: bool,
}

impl ApprovalView {
    /// Format one approval record.
    #[must_use]
    pub fn from_approval(approval: &Approval) -> Self {
        Self {
            label: approval.label.chars().take(1).collect(),
            value: signed(approval.value),
            reviewer: approval.by.identity().to_string(),
            positive: approval.value > 0,
        }
    }

    fn render(&self, color: bool) -> String {
        let vote = format!("{}{}", self.label, self.value);
        let vote = if !color {
            vote
        } else if self.positive {
            vote.green().to_string()
        } else if self.value.starts_with('-') {
            vote.red().to_string()
        } else {
            vote
        };
        format!("{vote} {}", self.reviewer)
    }
}

/// Display-ready fields of one changeset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangesetRow {
    /// Change number.
    pub number: String,
    /// Commit subject.
    pub subject: String,
    /// Owner handle, falling back to their email.
    pub owner: String,
    /// Status label, `WIP` for work in progress.
    pub status: String,
    /// Topic, if any.
    pub topic: Option<String>,
    /// Web URL.
    pub url: String,
    /// Ref of the current patchset.
    #[serde(rename = "ref")]
    pub ref_name: String,
    /// Votes on the current patchset.
    pub approvals: Vec<ApprovalView>,
}

impl ChangesetRow {
    /// Format a query record.
    #[must_use]
    pub fn from_record(record: &ChangesetRecord) -> Self {
        Self {
            number: record.number.clone(),
            subject: record.subject.clone(),
            owner: record.owner.identity().to_string(),
            status: display_status(&record.status).to_string(),
            topic: record.topic.clone(),
            url: record.url.clone(),
            ref_name: record.current_patch_set.ref_name.clone(),
            approvals: record
                .current_patch_set
                .approvals
                .iter()
                .map(ApprovalView::from_approval)
                .collect(),
        }
    }

    /// One listing line.
    #[must_use]
    pub fn render(&self, color: bool) -> String {
        let status = if color {
            self.status.yellow().to_string()
        } else {
            self.status.clone()
        };
        let mut line = format!("{} {status} {} ({})", self.number, self.subject, self.owner);
        if let Some(topic) = &self.topic {
            line.push_str(&format!(" [{topic}]"));
        }
        if !self.approvals.is_empty() {
            let votes: Vec<String> = self.approvals.iter().map(|a| a.render(color)).collect();
            line.push_str(&format!(" {{{}}}", votes.join(", ")));
        }
        line.push(' ');
        line.push_str(&self.ref_name);
        line
    }
}

/// Status as shown to the user.
#[must_use]
pub fn display_status(status: &str) -> &str {
    if status == "WORKINPROGRESS" {
        "WIP"
    } else {
        status
    }
}

/// `+2`, `+0`, `-1`.
#[must_use]
pub fn signed(value: i32) -> String {
    if value >= 0 {
        format!("+{value}")
    } else {
        value.to_string()
    }
}
