//! Subprocess spawn port (interface).

use std::path::Path;
use std::time::Duration;

use crate::error::Result;

/// Signals the supervisor can deliver to a child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    /// Ask the process to shut down (SIGTERM / plain taskkill).
    Terminate,
    /// Kill immediately (SIGKILL / taskkill /F).
    Kill,
}

/// A long-running child process.
pub trait ChildProcess: Send + Sync {
    /// OS process id, if the process was started.
    fn pid(&self) -> Option<u32>;

    /// Deliver a signal.
    fn signal(&self, signal: Signal) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Wait up to `timeout` for the process to exit. Returns true once it has.
    fn wait_for_exit(
        &self,
        timeout: Duration,
    ) -> impl std::future::Future<Output = bool> + Send;
}

/// Port for spawning long-running subprocesses.
pub trait Spawner: Send + Sync {
    type Child: ChildProcess + 'static;

    /// Start `program` with `args`. Returns as soon as the process exists.
    fn spawn(&self, program: &Path, args: &[String]) -> Result<Self::Child>;
}
