//! Launching and terminating the per-session interception subprocess.

use tracing::{info, warn};

use super::daemon::{daemon_selector, replace_args};
use crate::adapters::ToolPaths;
use crate::config::Settings;
use crate::error::Result;
use crate::ports::{ChildProcess, Signal, Spawner};

/// Starts `replace` subprocesses and shuts them down gracefully, then forcefully.
///
/// The supervisor is lent child handles; it never decides a session's fate.
pub struct ProcessSupervisor<S> {
    spawner: S,
    tools: ToolPaths,
    settings: Settings,
}

impl<S: Spawner> ProcessSupervisor<S> {
    pub fn new(spawner: S, tools: ToolPaths, settings: Settings) -> Self {
        Self {
            spawner,
            tools,
            settings,
        }
    }

    /// Spawns the interception for `deployment` and returns without waiting.
    pub fn launch(
        &self,
        deployment: &str,
        namespace: &str,
        context: &str,
        local_port: u16,
    ) -> Result<S::Child> {
        let telepresence = self.tools.telepresence()?;
        let selector = daemon_selector(context, namespace);
        let env_file = self.settings.env_file_for(deployment);
        let args = replace_args(
            deployment,
            &selector,
            local_port,
            self.settings.target_port,
            &env_file,
        );

        let child = self.spawner.spawn(telepresence, &args)?;
        info!(
            deployment,
            namespace,
            selector = %selector,
            local_port,
            pid = ?child.pid(),
            "Interception process launched"
        );
        Ok(child)
    }

    /// Asks the child to exit, then kills it if it lingers.
    ///
    /// Returns whether the exit was observed. Never fails: the `leave`
    /// command that follows is what actually ends the interception.
    pub async fn terminate(&self, child: &S::Child) -> bool {
        let pid = child.pid().unwrap_or_default();

        if let Err(e) = child.signal(Signal::Terminate).await {
            warn!(pid, error = %e, "Failed to send terminate signal");
        }
        if child.wait_for_exit(self.settings.terminate_grace()).await {
            info!(pid, "Interception process exited");
            return true;
        }

        warn!(
            pid,
            grace_ms = self.settings.terminate_grace_ms,
            "Interception process ignored terminate, killing"
        );
        if let Err(e) = child.signal(Signal::Kill).await {
            warn!(pid, error = %e, "Failed to send kill signal");
        }
        if child.wait_for_exit(self.settings.kill_wait()).await {
            info!(pid, "Interception process killed");
            return true;
        }

        warn!(pid, "Interception process may still be running");
        false
    }
}
