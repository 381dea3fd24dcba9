//! Subprocess spawner backed by `tokio::process`.
//!
//! Output and exit observers only log. Session state is never touched from
//! here; the orchestrator owns every transition.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::ports::{ChildProcess, Signal, Spawner};

/// Spawns long-running children and watches them from background tasks.
#[derive(Debug, Default, Clone)]
pub struct TokioSpawner;

impl TokioSpawner {
    pub fn new() -> Self {
        Self
    }
}

/// Handle to a child spawned by [`TokioSpawner`].
#[derive(Debug)]
pub struct TokioChild {
    pid: Option<u32>,
    label: String,
    exited: watch::Receiver<bool>,
}

impl Spawner for TokioSpawner {
    type Child = TokioChild;

    fn spawn(&self, program: &Path, args: &[String]) -> Result<TokioChild> {
        let label = program
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| program.display().to_string());

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::CommandFailed {
                command: format!("{} {}", label, args.join(" ")),
                message: format!("Failed to start process: {}", e),
            })?;

        let pid = child.id();
        info!(process = %label, pid = ?pid, "Process started");

        if let Some(stdout) = child.stdout.take() {
            let label = label.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(process = %label, "{}", line);
                }
            });
        }

        if let Some(stderr) = child.stderr.take() {
            let label = label.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if is_error_line(&line) {
                        warn!(process = %label, "{}", line);
                    } else {
                        debug!(process = %label, "{}", line);
                    }
                }
            });
        }

        let (tx, rx) = watch::channel(false);
        {
            let label = label.clone();
            tokio::spawn(async move {
                match child.wait().await {
                    Ok(status) => info!(process = %label, pid = ?pid, %status, "Process exited"),
                    Err(e) => warn!(process = %label, pid = ?pid, error = %e, "Failed to wait for process"),
                }
                let _ = tx.send(true);
            });
        }

        Ok(TokioChild {
            pid,
            label,
            exited: rx,
        })
    }
}

impl ChildProcess for TokioChild {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    async fn signal(&self, signal: Signal) -> Result<()> {
        let exited = *self.exited.borrow();
        if exited {
            return Ok(());
        }

        let pid = self.pid.ok_or_else(|| Error::ProcessTerminationIncomplete {
            pid: 0,
            reason: format!("{} has no process id", self.label),
        })?;

        debug!(process = %self.label, pid, ?signal, "Sending signal to process");
        send_signal(pid, signal).await
    }

    async fn wait_for_exit(&self, limit: Duration) -> bool {
        let mut exited = self.exited.clone();
        if *exited.borrow() {
            return true;
        }
        // A closed channel means the watcher task finished, so the child is gone.
        let done = timeout(limit, exited.wait_for(|done| *done)).await.is_ok();
        done
    }
}

#[cfg(unix)]
async fn send_signal(pid: u32, signal: Signal) -> Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal as UnixSignal};
    use nix::unistd::Pid;

    let unix_signal = match signal {
        Signal::Terminate => UnixSignal::SIGTERM,
        Signal::Kill => UnixSignal::SIGKILL,
    };

    match kill(Pid::from_raw(pid as i32), unix_signal) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(Error::ProcessTerminationIncomplete {
            pid,
            reason: e.to_string(),
        }),
    }
}

/// Upper bound on a single `taskkill` invocation.
#[cfg(windows)]
const TASKKILL_TIMEOUT: Duration = Duration::from_secs(5);

/// Console processes usually refuse a plain `taskkill`, so a refused
/// terminate is retried with `/F`.
#[cfg(windows)]
async fn send_signal(pid: u32, signal: Signal) -> Result<()> {
    match taskkill(pid, signal == Signal::Kill).await {
        Err(e) if signal == Signal::Terminate => {
            debug!(pid, error = %e, "Plain taskkill refused, forcing");
            taskkill(pid, true).await
        }
        result => result,
    }
}

#[cfg(windows)]
async fn taskkill(pid: u32, force: bool) -> Result<()> {
    let pid_str = pid.to_string();
    let mut args = vec!["/PID", pid_str.as_str(), "/T"];
    if force {
        args.push("/F");
    }

    let result = timeout(TASKKILL_TIMEOUT, async {
        Command::new("taskkill")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
    })
    .await;

    match result {
        Ok(Ok(status)) if status.success() => Ok(()),
        Ok(Ok(status)) => Err(Error::ProcessTerminationIncomplete {
            pid,
            reason: format!("taskkill exited with {}", status),
        }),
        Ok(Err(e)) => Err(Error::ProcessTerminationIncomplete {
            pid,
            reason: e.to_string(),
        }),
        Err(_) => Err(Error::Timeout {
            command: format!("taskkill {}", args.join(" ")),
        }),
    }
}

/// Checks if a line of subprocess output indicates an error.
pub fn is_error_line(line: &str) -> bool {
    let line_lower = line.to_lowercase();
    line_lower.contains("error")
        || line_lower.contains("failed")
        || line_lower.contains("unable to")
        || line_lower.contains("connection refused")
        || line_lower.contains("lost connection")
        || line_lower.contains("panic")
}
