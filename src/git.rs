use crate::error::{Error, Result};
use crate::runner::Runner;

/// Marker git writes the most recently fetched ref to.
pub const FETCH_HEAD: &str = "FETCH_HEAD";

/// The `git` invocations this tool needs, run in the current directory.
pub struct Git<'a> {
    runner: &'a dyn Runner,
}

impl<'a> Git<'a> {
    /// Wrap `runner`.
    #[must_use]
    pub fn new(runner: &'a dyn Runner) -> Self {
        Self { runner }
    }

    fn git(&self, args: &[&str]) -> Result<String> {
        self.runner.run("git", args)
    }

    fn git_line(&self, args: &[&str]) -> Result<String> {
        Ok(self.git(args)?.trim().to_string())
    }

    /// `git status --porcelain`; empty when the tree is clean.
    ///
    /// # Errors
    ///
    /// Transport errors from `git`.
    pub fn status_porcelain(&self) -> Result<String> {
        Ok(self.git(&["status", "--porcelain"])?.trim_end().to_string())
    }

    /// The commit id of `HEAD`.
    ///
    /// # Errors
    ///
    /// Transport errors from `git`, e.g. outside a repository.
    pub fn head(&self) -> Result<String> {
        self.git_line(&["rev-parse", "HEAD"])
    }

    /// Short name of the checked-out branch.
    ///
    /// # Errors
    ///
    /// Fails on a detached `HEAD`.
    pub fn current_branch(&self) -> Result<String> {
        self.git_line(&["symbolic-ref", "--quiet", "--short", "HEAD"])
    }

    /// Whether `remote` has a branch called `branch`.
    ///
    /// # Errors
    ///
    /// Transport errors from `git ls-remote`.
    pub fn remote_has_branch(&self, remote: &str, branch: &str) -> Result<bool> {
        let refs = self.git(&["ls-remote", "--heads", remote, branch])?;
        Ok(!refs.trim().is_empty())
    }

    /// Refresh every remote-tracking ref of `remote`.
    ///
    /// # Errors
    ///
    /// Transport errors from `git fetch`.
    pub fn fetch_remote(&self, remote: &str) -> Result<()> {
        self.git(&["fetch", remote])?;
        Ok(())
    }

    /// Fetch a single ref into [`FETCH_HEAD`].
    ///
    /// # Errors
    ///
    /// Transport errors from `git fetch`.
    pub fn fetch_ref(&self, remote: &str, refspec: &str) -> Result<()> {
        self.git(&["fetch", remote, refspec])?;
        Ok(())
    }

    /// Best common ancestor of two commits.
    ///
    /// # Errors
    ///
    /// Transport errors from `git`, including unrelated histories.
    pub fn merge_base(&self, left: &str, right: &str) -> Result<String> {
        self.git_line(&["merge-base", left, right])
    }

    /// `git reset --hard <target>`.
    ///
    /// # Errors
    ///
    /// Transport errors from `git`.
    pub fn reset_hard(&self, target: &str) -> Result<()> {
        self.git(&["reset", "--hard", target])?;
        Ok(())
    }

    /// Value of a git config key, `None` when unset.
    ///
    /// # Errors
    ///
    /// Transport errors other than git's "key not set" exit status.
    pub fn config_get(&self, key: &str) -> Result<Option<String>> {
        match self.git_line(&["config", "--get", key]) {
            Ok(value) => Ok(Some(value)),
            Err(Error::TransportFailure { code: Some(1), .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedRunner;
    use anyhow::{bail, ensure};

    #[test]
    fn config_get_unset_is_none() -> anyhow::Result<()> {
        let runner = ScriptedRunner::new()
            .on("git config --get remote.origin.url", "ssh://review.example.com/grh\n")
            .fail("git config --get", 1, "");
        let git = Git::new(&runner);
        ensure!(
            git.config_get("remote.origin.url")?.as_deref() == Some("ssh://review.example.com/grh")
        );
        ensure!(git.config_get("gerrit.username")?.is_none());
        Ok(())
    }

    #[test]
    fn config_get_other_failures_propagate() -> anyhow::Result<()> {
        let runner = ScriptedRunner::new().fail("git config", 128, "fatal: bad config line 3");
        let git = Git::new(&runner);
        let Err(Error::TransportFailure { code, .. }) = git.config_get("remote.origin.url") else {
            bail!("expected TransportFailure");
        };
        ensure!(code == Some(128));
        Ok(())
    }

    #[test]
    fn status_keeps_leading_spaces() -> anyhow::Result<()> {
        let runner = ScriptedRunner::new().on("git status --porcelain", " M src/lib.rs\n");
        let git = Git::new(&runner);
        ensure!(git.status_porcelain()? == " M src/lib.rs");
        Ok(())
    }

    #[test]
    fn remote_branch_probe() -> anyhow::Result<()> {
        let runner = ScriptedRunner::new()
            .on(
                "git ls-remote --heads origin main",
                "2222222222222222222222222222222222222222\trefs/heads/main\n",
            )
            .on("git ls-remote --heads origin", "");
        let git = Git::new(&runner);
        ensure!(git.remote_has_branch("origin", "main")?);
        ensure!(!git.remote_has_branch("origin", "63155")?);
        Ok(())
    }
}
