//! Launch parameters for the tool provider process.

use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use crate::error::{McpError, Result};

/// How to start a tool provider.
///
/// The script, when set, is passed as the first argument to `command`
/// (for example `python3 catalyst-center-mcp.py`).
#[derive(Debug, Clone, Default)]
pub struct ServerParams {
    pub command: String,
    pub script: Option<PathBuf>,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub working_dir: Option<PathBuf>,
}

impl ServerParams {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    pub fn with_script(mut self, script: impl Into<PathBuf>) -> Self {
        self.script = Some(script.into());
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Fail with `ProviderUnavailable` if the script or an explicit
    /// executable path is missing. Nothing is spawned.
    pub fn check_available(&self) -> Result<()> {
        if let Some(script) = &self.script {
            if !script.exists() {
                return Err(McpError::ProviderUnavailable(script.clone()));
            }
        }
        if is_path_like(&self.command) && !Path::new(&self.command).exists() {
            return Err(McpError::ProviderUnavailable(PathBuf::from(&self.command)));
        }
        Ok(())
    }

    /// Full argument vector after the command
    pub fn argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 1);
        if let Some(script) = &self.script {
            argv.push(script.to_string_lossy().into_owned());
        }
        argv.extend(self.args.iter().cloned());
        argv
    }

    pub(crate) fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.command);
        cmd.args(self.argv())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        for (key, value) in &self.env {
            cmd.env(key, expand_env_vars(value));
        }

        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        cmd
    }
}

fn is_path_like(command: &str) -> bool {
    command.contains('/') || command.contains('\\')
}

/// Expand `${VAR}` references from the host environment; unknown
/// variables are left as written.
pub fn expand_env_vars(input: &str) -> String {
    expand_vars_with(input, |name| std::env::var(name).ok())
}

/// Expand `${VAR}` references through `lookup`
pub fn expand_vars_with<F>(input: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let re = match Regex::new(r"\$\{([^}]+)\}") {
        Ok(re) => re,
        Err(_) => return input.to_string(),
    };

    re.replace_all(input, |caps: &regex::Captures| {
        lookup(&caps[1]).unwrap_or_else(|| caps[0].to_string())
    })
    .into_owned()
}
