use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Every failure the library can report.
///
/// Handlers branch on the variant, never on message text. The binary wraps
/// these in `anyhow` only at the top level.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed changeset token or patchset number.
    #[error("invalid changeset `{input}`: {reason}")]
    InvalidFormat {
        /// The token as the user typed it.
        input: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A strict query returned nothing.
    #[error("no changeset matches `{query}`")]
    NotFound {
        /// The query criteria, space separated.
        query: String,
    },

    /// A strict query returned more than one changeset.
    #[error("`{query}` matches {count} changesets, expected exactly one")]
    AmbiguousResult {
        /// The query criteria, space separated.
        query: String,
        /// How many changesets came back.
        count: usize,
    },

    /// The changeset belongs to a different project than the one configured.
    #[error("changeset {change} belongs to project `{actual}`, not `{expected}`")]
    ProjectMismatch {
        /// Change number.
        change: String,
        /// Configured project.
        expected: String,
        /// Project reported by Gerrit.
        actual: String,
    },

    /// An external command exited unsuccessfully.
    #[error("`{command}` failed ({}){}", describe_code(.code), describe_output(.stdout, .stderr))]
    TransportFailure {
        /// The command line that was run.
        command: String,
        /// Exit code, `None` when terminated by a signal.
        code: Option<i32>,
        /// Captured standard output.
        stdout: String,
        /// Captured standard error.
        stderr: String,
    },

    /// An external command could not be started at all.
    #[error("could not run `{program}`")]
    Spawn {
        /// Program name.
        program: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// The working tree has uncommitted changes.
    #[error("working tree is not clean:\n{status}")]
    UncleanTree {
        /// Output of `git status --porcelain`.
        status: String,
    },

    /// HEAD is neither a known changeset nor contained in the upstream branch.
    #[error("HEAD {head} has not been uploaded for review and is not part of the upstream branch")]
    NotUploaded {
        /// The local head commit.
        head: String,
    },

    /// A review was requested on a patchset that is no longer current.
    #[error("changeset {change} is at patchset {current}, refusing to comment on patchset {requested}")]
    StalePatchset {
        /// Change number.
        change: String,
        /// Patchset the user named.
        requested: u32,
        /// Current patchset on the server.
        current: u32,
    },

    /// A project name matches several remote projects.
    #[error("project `{candidate}` is ambiguous, it matches: {}", .matches.join(", "))]
    AmbiguousProject {
        /// The name being resolved.
        candidate: String,
        /// Every remote project containing it.
        matches: Vec<String>,
    },

    /// The command needs a project and none could be resolved.
    #[error("no review project could be derived from the `{remote}` remote; pass --project")]
    MissingProject {
        /// Remote consulted for auto-derivation.
        remote: String,
    },

    /// Gerrit answered a query with an error record.
    #[error("gerrit rejected the query: {message}")]
    QueryRejected {
        /// Message from the error record.
        message: String,
    },

    /// A line of query output could not be decoded.
    #[error("unexpected query output: {line}")]
    MalformedResponse {
        /// The offending line.
        line: String,
        /// Decoder error.
        #[source]
        source: serde_json::Error,
    },

    /// A `list` pattern is not a valid regular expression.
    #[error("invalid pattern `{pattern}`")]
    InvalidPattern {
        /// The pattern as given.
        pattern: String,
        /// Regex compiler error.
        #[source]
        source: regex::Error,
    },

    /// The configured remote URL cannot be interpreted.
    #[error("cannot parse remote url `{url}`: {reason}")]
    InvalidRemoteUrl {
        /// The URL read from git config.
        url: String,
        /// What was wrong with it.
        reason: String,
    },
}

impl Error {
    pub(crate) fn invalid_format(input: &str, reason: impl Into<String>) -> Self {
        Self::InvalidFormat {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_string(),
    }
}

fn describe_output(stdout: &str, stderr: &str) -> String {
    let detail = if stderr.trim().is_empty() {
        stdout.trim()
    } else {
        stderr.trim()
    };
    if detail.is_empty() {
        String::new()
    } else {
        format!(": {detail}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::ensure;

    #[test]
    fn transport_failure_prefers_stderr() -> anyhow::Result<()> {
        let err = Error::TransportFailure {
            command: "git fetch origin".to_string(),
            code: Some(128),
            stdout: "ignored\n".to_string(),
            stderr: "fatal: couldn't find remote ref\n".to_string(),
        };
        ensure!(
            err.to_string()
                == "`git fetch origin` failed (exit code 128): fatal: couldn't find remote ref"
        );
        Ok(())
    }

    #[test]
    fn transport_failure_without_output() -> anyhow::Result<()> {
        let err = Error::TransportFailure {
            command: "ssh".to_string(),
            code: None,
            stdout: String::new(),
            stderr: String::new(),
        };
        ensure!(err.to_string() == "`ssh` failed (terminated by signal)");
        Ok(())
    }

    #[test]
    fn ambiguous_project_lists_matches() -> anyhow::Result<()> {
        let err = Error::AmbiguousProject {
            candidate: "nova".to_string(),
            matches: vec!["openstack/nova".to_string(), "openstack/nova-specs".to_string()],
        };
        ensure!(err.to_string().ends_with("openstack/nova, openstack/nova-specs"));
        Ok(())
    }
}
