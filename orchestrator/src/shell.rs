//! Shell command execution

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use crate::errors::SlotError;

/// A shell command line with its working directory and extra environment
#[derive(Debug, Clone, Default)]
pub struct ShellCommand {
    pub line: String,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

impl ShellCommand {
    pub fn new(line: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            ..Default::default()
        }
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Run the command through `sh -c` and capture its output.
    ///
    /// Only a failure to spawn is an error; a non-zero exit is reported in the
    /// returned output.
    pub async fn output(&self) -> Result<ShellOutput, SlotError> {
        debug!("Running `{}`", self.line);

        let mut command = Command::new("sh");
        command
            .args(["-c", &self.line])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }
        for (key, value) in &self.env {
            command.env(key, value);
        }

        let output = command
            .output()
            .await
            .map_err(|e| SlotError::Internal(format!("Failed to run `{}`: {}", self.line, e)))?;

        Ok(ShellOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    /// Run the command and turn a non-zero exit into an error message
    pub async fn run(&self) -> Result<ShellOutput, String> {
        let output = self.output().await.map_err(|e| e.to_string())?;
        if output.success {
            Ok(output)
        } else {
            Err(format!("`{}` failed: {}", self.line, output.describe()))
        }
    }
}

/// Captured result of a shell command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ShellOutput {
    /// Exit code plus the most useful captured stream
    pub fn describe(&self) -> String {
        let code = self
            .code
            .map(|c| format!("exit code {}", c))
            .unwrap_or_else(|| "terminated by signal".to_string());
        let detail = if self.stderr.is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        if detail.is_empty() {
            code
        } else {
            format!("{}: {}", code, detail)
        }
    }
}
