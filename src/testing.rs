//! Shared fixtures for unit tests.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::runner::{render_command, Runner};
use std::cell::RefCell;

pub(crate) const STATS: &str =
    r#"{"type":"stats","rowCount":1,"runTimeMilliseconds":4,"moreChanges":false}"#;

pub(crate) const HEAD: &str = "1111111111111111111111111111111111111111";

enum Reply {
    Stdout(String),
    Fail { code: i32, stderr: String },
}

/// A [`Runner`] that answers from a script and records every command line.
///
/// Rules are checked in registration order; the first whose key is a
/// substring of the rendered command line answers. Anything unscripted fails
/// with exit code 127.
pub(crate) struct ScriptedRunner {
    rules: Vec<(String, Reply)>,
    calls: RefCell<Vec<String>>,
}

impl ScriptedRunner {
    pub(crate) fn new() -> Self {
        Self {
            rules: Vec::new(),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn on(mut self, key: &str, stdout: &str) -> Self {
        self.rules
            .push((key.to_string(), Reply::Stdout(stdout.to_string())));
        self
    }

    pub(crate) fn fail(mut self, key: &str, code: i32, stderr: &str) -> Self {
        self.rules.push((
            key.to_string(),
            Reply::Fail {
                code,
                stderr: stderr.to_string(),
            },
        ));
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub(crate) fn called(&self, key: &str) -> bool {
        self.calls.borrow().iter().any(|call| call.contains(key))
    }
}

impl Runner for ScriptedRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<String> {
        let command = render_command(program, args);
        self.calls.borrow_mut().push(command.clone());
        let reply = self
            .rules
            .iter()
            .find(|(key, _)| command.contains(key.as_str()))
            .map(|(_, reply)| reply);
        match reply {
            Some(Reply::Stdout(stdout)) => Ok(stdout.clone()),
            Some(Reply::Fail { code, stderr }) => Err(Error::TransportFailure {
                command,
                code: Some(*code),
                stdout: String::new(),
                stderr: stderr.clone(),
            }),
            None => Err(Error::TransportFailure {
                command,
                code: Some(127),
                stdout: String::new(),
                stderr: "unscripted command".to_string(),
            }),
        }
    }
}

pub(crate) fn sample_config() -> Config {
    Config {
        host: "review.example.com".to_string(),
        user: "alice".to_string(),
        port: 29418,
        remote: "origin".to_string(),
        project: Some("tools/grh".to_string()),
    }
}

pub(crate) fn revision_for(number: u64, patchset: u32) -> String {
    format!("{:0>32}{:0>8}", number, patchset)
}

pub(crate) fn change_json(number: u64, patchset: u32, project: &str) -> String {
    record_json(number, patchset, project, "NEW", &format!("Change {number}"), None)
}

pub(crate) fn record_json(
    number: u64,
    patchset: u32,
    project: &str,
    status: &str,
    subject: &str,
    topic: Option<&str>,
) -> String {
    let mut value = serde_json::json!({
        "project": project,
        "branch": "main",
        "id": format!("I{number:0>40}"),
        "number": number,
        "subject": subject,
        "owner": {"name": "Bob Builder", "email": "bob@example.com", "username": "bob"},
        "url": format!("https://review.example.com/{number}"),
        "status": status,
        "currentPatchSet": {
            "number": patchset,
            "revision": revision_for(number, patchset),
            "ref": format!("refs/changes/{:02}/{number}/{patchset}", number % 100),
            "approvals": [
                {"type": "Verified", "value": "1", "by": {"name": "CI", "email": "ci@example.com"}},
                {"type": "Code-Review", "value": "-1", "by": {"name": "Carol", "email": "carol@example.com", "username": "carol"}}
            ]
        }
    });
    if let (Some(topic), Some(map)) = (topic, value.as_object_mut()) {
        map.insert("topic".to_string(), serde_json::Value::from(topic));
    }
    value.to_string()
}
