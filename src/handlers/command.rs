//! Actions made of external commands.
//!
//! A [`CommandAction`] runs its steps in order and stops at the first one
//! that fails. Every step sees the payload on stdin and the hook name in the
//! `JEEVES_HOOK` environment variable; most ignore both.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{Action, HandlerError, Invocation};

/// Environment variable carrying the hook name into every step.
pub const HOOK_ENV: &str = "JEEVES_HOOK";

/// One command within an action.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Step {
    /// Program to run, looked up on `PATH` if not absolute.
    pub program: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Working directory. Defaults to the dispatcher's own.
    #[serde(default)]
    pub cwd: Option<PathBuf>,

    /// Run as this user via `runuser -u <user> --`.
    #[serde(default)]
    pub run_as: Option<String>,

    /// Run once in every subdirectory of this directory (sorted by name)
    /// instead of once in `cwd`.
    #[serde(default)]
    pub for_each_subdir: Option<PathBuf>,
}

impl Step {
    pub fn new(program: impl Into<String>) -> Self {
        Step {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            run_as: None,
            for_each_subdir: None,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn run_as(mut self, user: impl Into<String>) -> Self {
        self.run_as = Some(user.into());
        self
    }

    pub fn for_each_subdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.for_each_subdir = Some(dir.into());
        self
    }

    /// The command line as it will be logged.
    pub fn display(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 4);
        if let Some(user) = &self.run_as {
            parts.extend(["runuser", "-u", user.as_str(), "--"]);
        }
        parts.push(self.program.as_str());
        parts.extend(self.args.iter().map(String::as_str));
        parts.join(" ")
    }

    fn command(&self, cwd: Option<&Path>, invocation: &Invocation) -> Command {
        let mut cmd = match &self.run_as {
            Some(user) => {
                let mut cmd = Command::new("runuser");
                cmd.args(["-u", user.as_str(), "--", self.program.as_str()]);
                cmd
            }
            None => Command::new(&self.program),
        };
        cmd.args(&self.args);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        cmd.env(HOOK_ENV, invocation.hook.as_str());
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

/// A named sequence of steps, optionally gated on the pushed ref.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandAction {
    name: String,

    /// If set, the payload's `ref` field must equal this (e.g.
    /// `refs/heads/main`); otherwise the action succeeds without running
    /// anything.
    #[serde(default)]
    only_ref: Option<String>,

    steps: Vec<Step>,
}

impl CommandAction {
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        CommandAction {
            name: name.into(),
            only_ref: None,
            steps,
        }
    }

    pub fn only_ref(mut self, git_ref: impl Into<String>) -> Self {
        self.only_ref = Some(git_ref.into());
        self
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Whether the payload passes the `only_ref` gate.
    fn ref_matches(&self, payload: &[u8]) -> bool {
        let Some(wanted) = &self.only_ref else {
            return true;
        };
        let pushed = serde_json::from_slice::<serde_json::Value>(payload)
            .ok()
            .and_then(|v| v.get("ref").and_then(|r| r.as_str()).map(str::to_owned));
        match pushed {
            Some(pushed) if &pushed == wanted => true,
            other => {
                info!(
                    action = %self.name,
                    wanted = %wanted,
                    pushed = ?other,
                    "Ref does not match, skipping action"
                );
                false
            }
        }
    }

    fn run_step(
        &self,
        step: &Step,
        cwd: Option<&Path>,
        invocation: &Invocation,
    ) -> Result<(), HandlerError> {
        let command = step.display();
        debug!(action = %self.name, command = %command, cwd = ?cwd, "Running step");

        let output = spawn_with_stdin(step.command(cwd, invocation), &invocation.payload)
            .map_err(|source| HandlerError::Spawn {
                action: self.name.clone(),
                command: command.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            debug!(action = %self.name, command = %command, stdout = %stdout.trim(), "Step output");
        }

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(
                action = %self.name,
                command = %command,
                code = ?output.status.code(),
                stderr = %stderr.trim(),
                "Step failed"
            );
            Err(HandlerError::ActionFailed {
                action: self.name.clone(),
                command,
                code: output.status.code(),
            })
        }
    }
}

impl Action for CommandAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke(&self, invocation: &Invocation) -> Result<(), HandlerError> {
        if !self.ref_matches(&invocation.payload) {
            return Ok(());
        }

        for step in &self.steps {
            match &step.for_each_subdir {
                Some(parent) => {
                    for dir in subdirectories(parent).map_err(|source| HandlerError::ListDir {
                        action: self.name.clone(),
                        path: parent.display().to_string(),
                        source,
                    })? {
                        self.run_step(step, Some(&dir), invocation)?;
                    }
                }
                None => self.run_step(step, step.cwd.as_deref(), invocation)?,
            }
        }
        Ok(())
    }
}

/// Spawns `cmd`, feeds it `stdin` and collects its output.
///
/// Stdin is written from a separate thread so a child that never reads it
/// cannot deadlock against a full output pipe.
fn spawn_with_stdin(mut cmd: Command, stdin: &[u8]) -> std::io::Result<Output> {
    let mut child = cmd.spawn()?;
    let pipe = child.stdin.take();

    std::thread::scope(|s| {
        if let Some(mut pipe) = pipe {
            s.spawn(move || {
                // A child that exits without reading stdin closes the pipe early.
                let _ = pipe.write_all(stdin);
            });
        }
        child.wait_with_output()
    })
}

/// Lists the immediate subdirectories of `parent`, sorted by name.
fn subdirectories(parent: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(parent)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}
