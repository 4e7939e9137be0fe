//! Gerrit over SSH.
//!
//! `gerrit query --format=JSON` prints one JSON object per line and finishes
//! with a `{"type":"stats",...}` trailer that is not a changeset.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::runner::{sh_single_quote, Runner};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, info};

/// A Gerrit account as embedded in query records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Contact address.
    #[serde(default)]
    pub email: Option<String>,
    /// Short handle.
    #[serde(default)]
    pub username: Option<String>,
}

impl Account {
    /// The handle if there is one, else the email, else the display name.
    #[must_use]
    pub fn identity(&self) -> &str {
        self.username
            .as_deref()
            .or(self.email.as_deref())
            .or(self.name.as_deref())
            .unwrap_or_default()
    }
}

/// One vote on a patchset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    /// Label name, e.g. `Code-Review` or `Verified`.
    #[serde(rename = "type")]
    pub label: String,
    /// Vote value; Gerrit sends it as a string such as `"-1"`.
    #[serde(deserialize_with = "de_i32")]
    pub value: i32,
    /// Who voted.
    #[serde(default)]
    pub by: Account,
}

/// The current patchset of a changeset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchSet {
    /// Patchset number.
    #[serde(deserialize_with = "de_u32")]
    pub number: u32,
    /// Commit id.
    pub revision: String,
    /// Fetchable ref, `refs/changes/..`.
    #[serde(rename = "ref")]
    pub ref_name: String,
    /// Votes on this patchset.
    #[serde(default)]
    pub approvals: Vec<Approval>,
}

/// One changeset as returned by `gerrit query --current-patch-set`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangesetRecord {
    /// Project the change belongs to.
    pub project: String,
    /// Target branch.
    #[serde(default)]
    pub branch: String,
    /// Change number.
    #[serde(deserialize_with = "de_string")]
    pub number: String,
    /// First line of the commit message.
    #[serde(default)]
    pub subject: String,
    /// Change owner.
    #[serde(default)]
    pub owner: Account,
    /// Review status, e.g. `NEW`, `MERGED`, `WORKINPROGRESS`.
    #[serde(default)]
    pub status: String,
    /// Web URL of the change.
    #[serde(default)]
    pub url: String,
    /// Optional topic.
    #[serde(default)]
    pub topic: Option<String>,
    /// Latest patchset.
    pub current_patch_set: PatchSet,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Number(i64),
}

fn de_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::String(s) => s,
        StringOrNumber::Number(n) => n.to_string(),
    })
}

fn de_i32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i32, D::Error> {
    match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
        StringOrNumber::Number(n) => i32::try_from(n).map_err(serde::de::Error::custom),
    }
}

fn de_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
        StringOrNumber::Number(n) => u32::try_from(n).map_err(serde::de::Error::custom),
    }
}

/// Decode `gerrit query --format=JSON` output, dropping the stats trailer.
///
/// # Errors
///
/// [`Error::QueryRejected`] for an error record and
/// [`Error::MalformedResponse`] for a line that is not a changeset.
pub fn parse_query_output(stdout: &str) -> Result<Vec<ChangesetRecord>> {
    let mut records = Vec::new();
    for line in stdout.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value: Value =
            serde_json::from_str(line).map_err(|source| Error::MalformedResponse {
                line: line.to_string(),
                source,
            })?;
        match value.get("type").and_then(Value::as_str) {
            Some("stats") => continue,
            Some("error") => {
                let message = value
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error");
                return Err(Error::QueryRejected {
                    message: message.to_string(),
                });
            }
            _ => {}
        }
        let record = serde_json::from_value(value).map_err(|source| Error::MalformedResponse {
            line: line.to_string(),
            source,
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Client for the `gerrit` commands reachable over `ssh`.
pub struct GerritClient<'a> {
    runner: &'a dyn Runner,
    destination: String,
    port: String,
}

impl<'a> GerritClient<'a> {
    /// Client for the server named in `config`.
    #[must_use]
    pub fn new(runner: &'a dyn Runner, config: &Config) -> Self {
        let destination = if config.user.is_empty() {
            config.host.clone()
        } else {
            format!("{}@{}", config.user, config.host)
        };
        Self {
            runner,
            destination,
            port: config.port.to_string(),
        }
    }

    fn ssh(&self, command: &[&str]) -> Result<String> {
        let mut args = vec!["-p", self.port.as_str(), self.destination.as_str(), "gerrit"];
        args.extend_from_slice(command);
        self.runner.run("ssh", &args)
    }

    /// Run `gerrit query` and return every changeset it reports.
    ///
    /// # Errors
    ///
    /// Transport errors from `ssh` and decoding errors from
    /// [`parse_query_output`].
    pub fn query<S: AsRef<str>>(&self, criteria: &[S]) -> Result<Vec<ChangesetRecord>> {
        let mut command = vec!["query", "--format=JSON", "--current-patch-set"];
        command.extend(criteria.iter().map(|c| c.as_ref()));
        let stdout = self.ssh(&command)?;
        let records = parse_query_output(&stdout)?;
        debug!(query = %join(criteria), count = records.len(), "query finished");
        Ok(records)
    }

    /// Run a query that must identify at most one changeset.
    ///
    /// Returns `Ok(None)` for an empty result unless `strict` is set.
    ///
    /// # Errors
    ///
    /// [`Error::AmbiguousResult`] for several results, [`Error::NotFound`]
    /// for none when `strict`, and [`Error::ProjectMismatch`] when `project`
    /// is given and differs from the result's.
    pub fn query_one<S: AsRef<str>>(
        &self,
        criteria: &[S],
        project: Option<&str>,
        strict: bool,
    ) -> Result<Option<ChangesetRecord>> {
        let mut records = self.query(criteria)?;
        if records.len() > 1 {
            return Err(Error::AmbiguousResult {
                query: join(criteria),
                count: records.len(),
            });
        }
        let Some(record) = records.pop() else {
            if strict {
                return Err(Error::NotFound {
                    query: join(criteria),
                });
            }
            return Ok(None);
        };
        if let Some(expected) = project {
            if record.project != expected {
                return Err(Error::ProjectMismatch {
                    change: record.number,
                    expected: expected.to_string(),
                    actual: record.project,
                });
            }
        }
        Ok(Some(record))
    }

    /// Post `message` as a review comment on `revision`.
    ///
    /// # Errors
    ///
    /// Transport errors from `ssh`.
    pub fn review(&self, revision: &str, message: &str) -> Result<()> {
        let quoted = sh_single_quote(message);
        self.ssh(&["review", "--message", quoted.as_str(), revision])?;
        info!(%revision, "posted review comment");
        Ok(())
    }

    /// Every project visible to the configured user.
    ///
    /// # Errors
    ///
    /// Transport errors from `ssh`.
    pub fn ls_projects(&self) -> Result<Vec<String>> {
        let stdout = self.ssh(&["ls-projects"])?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }
}

fn join<S: AsRef<str>>(criteria: &[S]) -> String {
    criteria
        .iter()
        .map(|c| c.as_ref())
        .collect::<Vec<&str>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{change_json, sample_config, ScriptedRunner, STATS};
    use anyhow::{bail, ensure};

    #[test]
    fn stats_trailer_is_dropped() -> anyhow::Result<()> {
        let stdout = format!("{}\n{STATS}\n", change_json(63155, 3, "tools/grh"));
        let records = parse_query_output(&stdout)?;
        ensure!(records.len() == 1);
        let Some(record) = records.first() else {
            bail!("missing record");
        };
        ensure!(record.number == "63155");
        ensure!(record.current_patch_set.number == 3);
        ensure!(record.current_patch_set.ref_name == "refs/changes/55/63155/3");
        Ok(())
    }

    #[test]
    fn string_encoded_numbers_are_accepted() -> anyhow::Result<()> {
        let line = r#"{"project":"tools/grh","number":"42","subject":"Fix it","status":"NEW","url":"https://review.example.com/42","currentPatchSet":{"number":"2","revision":"abc123","ref":"refs/changes/42/42/2","approvals":[{"type":"Verified","value":"-1","by":{"email":"ci@example.com"}}]}}"#;
        let records = parse_query_output(line)?;
        let Some(record) = records.first() else {
            bail!("missing record");
        };
        ensure!(record.number == "42");
        ensure!(record.current_patch_set.number == 2);
        let Some(approval) = record.current_patch_set.approvals.first() else {
            bail!("missing approval");
        };
        ensure!(approval.value == -1);
        ensure!(approval.by.identity() == "ci@example.com");
        Ok(())
    }

    #[test]
    fn error_record_is_rejected() -> anyhow::Result<()> {
        let stdout = r#"{"type":"error","message":"no such operator: bogus"}"#;
        let Err(Error::QueryRejected { message }) = parse_query_output(stdout) else {
            bail!("expected QueryRejected");
        };
        ensure!(message == "no such operator: bogus");
        Ok(())
    }

    #[test]
    fn garbage_line_is_malformed() -> anyhow::Result<()> {
        let Err(Error::MalformedResponse { line, .. }) = parse_query_output("Welcome to Gerrit\n")
        else {
            bail!("expected MalformedResponse");
        };
        ensure!(line == "Welcome to Gerrit");
        Ok(())
    }

    #[test]
    fn query_runs_over_ssh() -> anyhow::Result<()> {
        let runner = ScriptedRunner::new().on(
            "gerrit query",
            &format!("{}\n{STATS}\n", change_json(63155, 3, "tools/grh")),
        );
        let config = sample_config();
        let client = GerritClient::new(&runner, &config);
        let records = client.query(&["change:63155"])?;
        ensure!(records.len() == 1);
        ensure!(runner.calls()
            == vec![
                "ssh -p 29418 alice@review.example.com gerrit query --format=JSON --current-patch-set change:63155"
                    .to_string()
            ]);
        Ok(())
    }

    #[test]
    fn query_one_with_stats_yields_single_record() -> anyhow::Result<()> {
        let runner = ScriptedRunner::new().on(
            "change:63155",
            &format!("{}\n{STATS}\n", change_json(63155, 3, "tools/grh")),
        );
        let config = sample_config();
        let client = GerritClient::new(&runner, &config);
        let record = client.query_one(&["change:63155"], Some("tools/grh"), true)?;
        ensure!(record.is_some_and(|r| r.number == "63155"));
        Ok(())
    }

    #[test]
    fn query_one_rejects_multiple() -> anyhow::Result<()> {
        let stdout = format!(
            "{}\n{}\n{STATS}\n",
            change_json(1, 1, "tools/grh"),
            change_json(2, 1, "tools/grh")
        );
        let runner = ScriptedRunner::new().on("gerrit query", &stdout);
        let config = sample_config();
        let client = GerritClient::new(&runner, &config);
        let Err(Error::AmbiguousResult { count, .. }) = client.query_one(&["topic:x"], None, false)
        else {
            bail!("expected AmbiguousResult");
        };
        ensure!(count == 2);
        Ok(())
    }

    #[test]
    fn query_one_empty_strict_and_lenient() -> anyhow::Result<()> {
        let runner = ScriptedRunner::new().on("gerrit query", &format!("{STATS}\n"));
        let config = sample_config();
        let client = GerritClient::new(&runner, &config);
        ensure!(client.query_one(&["change:9"], None, false)?.is_none());
        let Err(Error::NotFound { query }) = client.query_one(&["change:9"], None, true) else {
            bail!("expected NotFound");
        };
        ensure!(query == "change:9");
        Ok(())
    }

    #[test]
    fn query_one_checks_project() -> anyhow::Result<()> {
        let runner = ScriptedRunner::new().on(
            "gerrit query",
            &format!("{}\n{STATS}\n", change_json(63155, 3, "other/project")),
        );
        let config = sample_config();
        let client = GerritClient::new(&runner, &config);
        let Err(Error::ProjectMismatch { actual, .. }) =
            client.query_one(&["change:63155"], Some("tools/grh"), true)
        else {
            bail!("expected ProjectMismatch");
        };
        ensure!(actual == "other/project");
        Ok(())
    }

    #[test]
    fn review_quotes_message() -> anyhow::Result<()> {
        let runner = ScriptedRunner::new().on("gerrit review", "");
        let config = sample_config();
        let client = GerritClient::new(&runner, &config);
        client.review("abc123", "don't merge yet")?;
        ensure!(runner.calls()
            == vec![
                "ssh -p 29418 alice@review.example.com gerrit review --message 'don'\\''t merge yet' abc123"
                    .to_string()
            ]);
        Ok(())
    }

    #[test]
    fn ls_projects_skips_blank_lines() -> anyhow::Result<()> {
        let runner = ScriptedRunner::new().on("gerrit ls-projects", "All-Projects\ntools/grh\n\n");
        let config = sample_config();
        let client = GerritClient::new(&runner, &config);
        ensure!(client.ls_projects()? == vec!["All-Projects".to_string(), "tools/grh".to_string()]);
        Ok(())
    }

    #[test]
    fn transport_failure_propagates() -> anyhow::Result<()> {
        let runner = ScriptedRunner::new().fail("gerrit query", 255, "Permission denied (publickey).");
        let config = sample_config();
        let client = GerritClient::new(&runner, &config);
        let Err(Error::TransportFailure { code, stderr, .. }) = client.query(&["status:open"]) else {
            bail!("expected TransportFailure");
        };
        ensure!(code == Some(255));
        ensure!(stderr.contains("publickey"));
        Ok(())
    }
}
