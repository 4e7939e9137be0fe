//! Configuration is resolved once at startup from, in order of precedence:
//! command-line flags, the URL of the configured git remote, git config
//! (`gerrit.username`) and `$USER`, and built-in defaults.

use crate::error::{Error, Result};
use crate::gerrit::GerritClient;
use crate::git::Git;
use serde::Serialize;
use tracing::{debug, warn};
use url::Url;

/// Host used when neither flags nor the remote name one.
pub const DEFAULT_HOST: &str = "localhost";
/// Gerrit's standard SSH port.
pub const DEFAULT_PORT: u16 = 29418;
/// Remote whose URL is inspected.
pub const DEFAULT_REMOTE: &str = "origin";
/// git config key holding the review username.
pub const USERNAME_KEY: &str = "gerrit.username";

/// Resolved settings shared by every command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Config {
    /// Review server host name.
    pub host: String,
    /// SSH user; empty lets `ssh` pick.
    pub user: String,
    /// SSH port.
    pub port: u16,
    /// git remote that points at the review server.
    pub remote: String,
    /// Project name or fragment, matched against the server's project list.
    pub project: Option<String>,
}

/// Values given on the command line; each one wins over derived values.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// `--host`.
    pub host: Option<String>,
    /// `--user`.
    pub user: Option<String>,
    /// `--port`.
    pub port: Option<u16>,
    /// `--remote`.
    pub remote: Option<String>,
    /// `--project`.
    pub project: Option<String>,
}

/// The parts of a git remote URL relevant to Gerrit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteUrl {
    /// Host name.
    pub host: String,
    /// User name embedded in the URL.
    pub user: Option<String>,
    /// SSH port; only `ssh://` URLs carry one.
    pub port: Option<u16>,
    /// Project path without `.git`.
    pub project: Option<String>,
}

/// Split a git remote URL into host, user, port and project.
///
/// Understands `ssh://`, `http(s)://` and scp-like `user@host:path` forms.
///
/// # Errors
///
/// [`Error::InvalidRemoteUrl`] for local paths, other schemes, or URLs
/// without a host.
pub fn parse_remote_url(raw: &str) -> Result<RemoteUrl> {
    let invalid = |reason: &str| Error::InvalidRemoteUrl {
        url: raw.to_string(),
        reason: reason.to_string(),
    };

    if raw.contains("://") {
        let url = Url::parse(raw).map_err(|err| invalid(&err.to_string()))?;
        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| invalid("no host"))?
            .to_string();
        let user = Some(url.username())
            .filter(|user| !user.is_empty())
            .map(str::to_string);
        return match url.scheme() {
            "ssh" | "git+ssh" | "ssh+git" => Ok(RemoteUrl {
                host,
                user,
                port: url.port(),
                project: project_from_path(url.path()),
            }),
            "http" | "https" => {
                let path = url.path().trim_start_matches('/');
                // Authenticated HTTP remotes are served under `/a/`.
                let path = path.strip_prefix("a/").unwrap_or(path);
                Ok(RemoteUrl {
                    host,
                    user,
                    port: None,
                    project: project_from_path(path),
                })
            }
            other => Err(invalid(&format!("unsupported scheme `{other}`"))),
        };
    }

    let Some((authority, path)) = raw.split_once(':') else {
        return Err(invalid("not a network remote"));
    };
    if authority.is_empty() || authority.contains('/') {
        return Err(invalid("not a network remote"));
    }
    let (user, host) = match authority.rsplit_once('@') {
        Some((user, host)) => (Some(user.to_string()).filter(|u| !u.is_empty()), host),
        None => (None, authority),
    };
    Ok(RemoteUrl {
        host: host.to_string(),
        user,
        port: None,
        project: project_from_path(path),
    })
}

fn project_from_path(path: &str) -> Option<String> {
    let path = path.trim_matches('/');
    let path = path.strip_suffix(".git").unwrap_or(path);
    if path.is_empty() {
        None
    } else {
        Some(path.to_string())
    }
}

impl Config {
    /// Resolve the configuration for this run.
    ///
    /// An unparsable remote URL is logged and ignored, so flags alone can
    /// still drive the tool.
    ///
    /// # Errors
    ///
    /// Transport errors from `git config` other than "key not set".
    pub fn resolve(git: &Git<'_>, overrides: ConfigOverrides) -> Result<Self> {
        let remote = overrides
            .remote
            .unwrap_or_else(|| DEFAULT_REMOTE.to_string());

        let from_remote = match git.config_get(&format!("remote.{remote}.url"))? {
            Some(raw) => match parse_remote_url(&raw) {
                Ok(parsed) => Some(parsed),
                Err(err) => {
                    warn!("ignoring remote `{remote}`: {err}");
                    None
                }
            },
            None => {
                debug!(%remote, "remote not configured, using defaults");
                None
            }
        };
        let from_remote = from_remote.unwrap_or_default();

        let user = match overrides.user.or(from_remote.user) {
            Some(user) => user,
            None => match git.config_get(USERNAME_KEY)? {
                Some(user) => user,
                None => std::env::var("USER").unwrap_or_default(),
            },
        };
        let host = overrides
            .host
            .or(Some(from_remote.host).filter(|host| !host.is_empty()))
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = overrides
            .port
            .or(from_remote.port)
            .unwrap_or(DEFAULT_PORT);

        let config = Self {
            host,
            user,
            port,
            remote,
            project: overrides.project.or(from_remote.project),
        };
        debug!(?config, "configuration resolved");
        Ok(config)
    }

    /// Resolve [`Config::project`] against the server's project list.
    ///
    /// Returns `None` when no project is configured or nothing matches.
    ///
    /// # Errors
    ///
    /// [`Error::AmbiguousProject`] and transport errors from `ssh`.
    pub fn lookup_project(&self, gerrit: &GerritClient<'_>) -> Result<Option<String>> {
        let Some(candidate) = self.project.as_deref() else {
            return Ok(None);
        };
        let projects = gerrit.ls_projects()?;
        let resolved = match_project(candidate, &projects)?;
        if resolved.is_none() {
            warn!("project `{candidate}` is not known to {}", self.host);
        }
        Ok(resolved)
    }

    /// Like [`Config::lookup_project`], but a project is mandatory.
    ///
    /// # Errors
    ///
    /// [`Error::MissingProject`] when nothing resolves.
    pub fn require_project(&self, gerrit: &GerritClient<'_>) -> Result<String> {
        self.lookup_project(gerrit)?
            .ok_or_else(|| Error::MissingProject {
                remote: self.remote.clone(),
            })
    }
}

/// Pick the project `candidate` refers to.
///
/// An exact name wins, then a unique `/<candidate>` suffix, then a unique
/// substring.
///
/// # Errors
///
/// [`Error::AmbiguousProject`] when several projects match and none exactly.
pub fn match_project(candidate: &str, projects: &[String]) -> Result<Option<String>> {
    if projects.iter().any(|project| project == candidate) {
        return Ok(Some(candidate.to_string()));
    }

    let suffix = format!("/{candidate}");
    let by_suffix: Vec<&String> = projects
        .iter()
        .filter(|project| project.ends_with(&suffix))
        .collect();
    if let [only] = by_suffix.as_slice() {
        return Ok(Some((*only).clone()));
    }

    let by_substring: Vec<String> = projects
        .iter()
        .filter(|project| project.contains(candidate))
        .cloned()
        .collect();
    match by_substring.len() {
        0 => Ok(None),
        1 => Ok(by_substring.into_iter().next()),
        _ => Err(Error::AmbiguousProject {
            candidate: candidate.to_string(),
            matches: by_substring,
        }),
    }
}
