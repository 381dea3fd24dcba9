//! Commands against the interception CLI's daemon.
//!
//! Every call after a connect is scoped with `--use <selector>` so this tool
//! only ever talks to the daemon for its own context/namespace pair.

use std::path::Path;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use tracing::{debug, info, warn};

use super::fallback::try_in_order;
use super::parser::parse_interceptions;
use crate::adapters::ToolPaths;
use crate::domain::{DaemonProbe, InterceptionRecord};
use crate::error::Result;
use crate::ports::CommandRunner;

/// Builds the daemon selector for a context/namespace pair.
pub fn daemon_selector(context: &str, namespace: &str) -> String {
    format!("{}-{}", context, namespace)
}

/// Arguments for the long-running `replace` subprocess.
pub fn replace_args(
    deployment: &str,
    selector: &str,
    local_port: u16,
    target_port: u16,
    env_file: &Path,
) -> Vec<String> {
    vec![
        "replace".to_string(),
        deployment.to_string(),
        "--use".to_string(),
        selector.to_string(),
        "--port".to_string(),
        format!("{}:{}", local_port, target_port),
        "--mount=false".to_string(),
        "--env-file".to_string(),
        env_file.display().to_string(),
    ]
}

/// Client for the interception CLI's short-lived commands.
pub struct TelepresenceDaemon<R> {
    runner: Arc<R>,
    tools: ToolPaths,
}

impl<R: CommandRunner> TelepresenceDaemon<R> {
    pub fn new(runner: Arc<R>, tools: ToolPaths) -> Self {
        Self { runner, tools }
    }

    /// Stops every running daemon. Failure is logged and ignored.
    pub async fn quit_all(&self) {
        if let Err(e) = self.execute(&["quit", "-s"]).await {
            debug!(error = %e, "No daemon to quit");
        }
    }

    /// Connects the daemon to a namespace.
    pub async fn connect(&self, namespace: &str) -> Result<()> {
        self.execute(&["connect", "--namespace", namespace]).await?;
        info!(namespace, "Daemon connected");
        Ok(())
    }

    /// Quits the daemon for `selector`, falling back to stopping all daemons.
    pub async fn quit(&self, selector: Option<&str>) -> Result<()> {
        let mut strategies: Vec<Vec<&str>> = Vec::new();
        if let Some(selector) = selector {
            strategies.push(vec!["quit", "--use", selector]);
        }
        strategies.push(vec!["quit", "-s"]);

        try_in_order("quit", strategies, move |args| async move {
            self.execute(&args).await.map(|_| ())
        })
        .await
    }

    /// Kills leftover daemon processes by name. Never fails.
    pub async fn kill_daemons(&self) {
        #[cfg(windows)]
        let (program, args): (&str, &[&str]) = ("taskkill", &["/F", "/IM", "telepresence.exe"]);
        #[cfg(not(windows))]
        let (program, args): (&str, &[&str]) = ("pkill", &["-f", "telepresence.*daemon"]);

        match self.runner.run(Path::new(program), args).await {
            Ok(_) => info!("Killed leftover daemon processes"),
            Err(e) => warn!(error = %e, "Failed to kill daemon processes"),
        }
    }

    /// Ends the interception of `deployment`.
    ///
    /// Tries the selector-qualified form, then the unqualified form, then a
    /// bare `leave`.
    pub async fn leave(&self, deployment: &str, selector: Option<&str>) -> Result<()> {
        let mut strategies: Vec<Vec<&str>> = Vec::new();
        if let Some(selector) = selector {
            strategies.push(vec!["leave", deployment, "--use", selector]);
        }
        strategies.push(vec!["leave", deployment]);
        strategies.push(vec!["leave"]);

        try_in_order("leave", strategies, move |args| async move {
            self.execute(&args).await.map(|_| ())
        })
        .await?;

        info!(deployment, "Left interception");
        Ok(())
    }

    /// Current interception listing as structured records.
    pub async fn list(&self, namespace: &str, selector: Option<&str>) -> Result<Vec<InterceptionRecord>> {
        let mut strategies: Vec<Vec<&str>> = Vec::new();
        if let Some(selector) = selector {
            strategies.push(vec!["list", "--use", selector]);
        }
        strategies.push(vec!["list"]);

        let output = try_in_order("list", strategies, move |args| async move {
            self.execute(&args).await
        })
        .await?;

        Ok(parse_interceptions(&output, namespace))
    }

    /// Raw daemon status. A failed probe reads as disconnected.
    pub async fn probe(&self) -> DaemonProbe {
        match self.execute(&["status"]).await {
            Ok(output) => parse_status(&output),
            Err(e) => {
                debug!(error = %e, "Daemon status probe failed");
                DaemonProbe::default()
            }
        }
    }

    async fn execute(&self, args: &[&str]) -> Result<String> {
        let telepresence = self.tools.telepresence()?;
        self.runner.run(telepresence, args).await
    }
}

struct StatusPatterns {
    status: Regex,
    connected_to: Regex,
    namespace: Regex,
    context: Regex,
}

fn status_patterns() -> &'static StatusPatterns {
    static PATTERNS: OnceLock<StatusPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| StatusPatterns {
        status: Regex::new(r"(?i)^\s*status\s*:\s*connected").unwrap(),
        connected_to: Regex::new(r"(?i)^\s*connected to context\s+(\S+)").unwrap(),
        namespace: Regex::new(r"(?i)^\s*namespace\s*:\s*(\S+)").unwrap(),
        context: Regex::new(r"(?i)^\s*kubernetes context\s*:\s*(\S+)").unwrap(),
    })
}

/// Reads connectivity, namespace and context out of `status` output.
pub fn parse_status(output: &str) -> DaemonProbe {
    let patterns = status_patterns();
    let mut probe = DaemonProbe::default();

    for line in output.lines() {
        if patterns.status.is_match(line) {
            probe.connected = true;
        } else if let Some(caps) = patterns.connected_to.captures(line) {
            probe.connected = true;
            probe.context.get_or_insert_with(|| caps[1].to_string());
        } else if let Some(caps) = patterns.namespace.captures(line) {
            probe.namespace.get_or_insert_with(|| caps[1].to_string());
        } else if let Some(caps) = patterns.context.captures(line) {
            probe.context.get_or_insert_with(|| caps[1].to_string());
        }
    }

    probe
}
