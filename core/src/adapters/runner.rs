//! Command runner backed by `tokio::process`.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use crate::error::{Error, Result};
use crate::ports::{render_command, CommandRunner};

/// Runs commands directly (no shell) with a fixed timeout.
#[derive(Debug, Clone)]
pub struct SystemCommandRunner {
    timeout: Duration,
}

impl SystemCommandRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for SystemCommandRunner {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl CommandRunner for SystemCommandRunner {
    async fn run(&self, program: &Path, args: &[&str]) -> Result<String> {
        let rendered = render_command(program, args);
        debug!(command = %rendered, "Running command");

        let result = timeout(self.timeout, async {
            Command::new(program)
                .args(args)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .output()
                .await
        })
        .await;

        match result {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
                if output.status.success() {
                    Ok(stdout)
                } else {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    let message = if stderr.trim().is_empty() {
                        stdout.as_str()
                    } else {
                        stderr.as_ref()
                    };
                    debug!(command = %rendered, status = ?output.status.code(), "Command failed");
                    Err(Error::from_command_output(rendered, message))
                }
            }
            Ok(Err(e)) => Err(Error::CommandFailed {
                command: rendered,
                message: e.to_string(),
            }),
            Err(_) => Err(Error::Timeout { command: rendered }),
        }
    }
}
