//! Scripted fakes for the command runner and subprocess spawner.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::adapters::ToolPaths;
use crate::error::{Error, Result};
use crate::ports::{render_command, ChildProcess, CommandRunner, Signal, Spawner};

/// Tool paths whose file stems match the names the fakes key on.
pub fn fake_tools() -> ToolPaths {
    ToolPaths::with_paths(
        Some(PathBuf::from("/fake/bin/telepresence")),
        Some(PathBuf::from("/fake/bin/kubectl")),
    )
}

#[derive(Debug, Clone)]
pub enum Response {
    Ok(String),
    Fail(String),
    Timeout,
    /// An error outside the command-failure family.
    Io(String),
}

/// Command runner answering from a script keyed by rendered command line.
///
/// Unscripted commands fail with `CommandFailed`.
#[derive(Default)]
pub struct FakeRunner {
    script: Mutex<HashMap<String, Response>>,
    calls: Mutex<Vec<String>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ok(&self, command: &str, stdout: &str) -> &Self {
        self.script
            .lock()
            .insert(command.to_string(), Response::Ok(stdout.to_string()));
        self
    }

    pub fn fail(&self, command: &str, stderr: &str) -> &Self {
        self.script
            .lock()
            .insert(command.to_string(), Response::Fail(stderr.to_string()));
        self
    }

    pub fn respond(&self, command: &str, response: Response) -> &Self {
        self.script.lock().insert(command.to_string(), response);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn called(&self, command: &str) -> bool {
        self.calls.lock().iter().any(|c| c == command)
    }

    pub fn position(&self, command: &str) -> Option<usize> {
        self.calls.lock().iter().position(|c| c == command)
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }
}

impl CommandRunner for FakeRunner {
    async fn run(&self, program: &Path, args: &[&str]) -> Result<String> {
        let rendered = render_command(program, args);
        self.calls.lock().push(rendered.clone());

        let response = self.script.lock().get(&rendered).cloned();
        match response {
            Some(Response::Ok(out)) => Ok(out),
            Some(Response::Fail(err)) => Err(Error::from_command_output(rendered, &err)),
            Some(Response::Timeout) => Err(Error::Timeout { command: rendered }),
            Some(Response::Io(msg)) => Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                msg,
            ))),
            None => Err(Error::from_command_output(rendered, "unscripted command")),
        }
    }
}

/// How a fake child reacts to signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildBehavior {
    /// Exits on the graceful terminate signal.
    Graceful,
    /// Ignores terminate, dies on kill.
    Stubborn,
    /// Signal delivery itself fails.
    Unsignalable,
}

#[derive(Debug)]
struct FakeChildState {
    behavior: ChildBehavior,
    exited: AtomicBool,
    signals: Mutex<Vec<Signal>>,
}

#[derive(Debug, Clone)]
pub struct FakeChild {
    pid: u32,
    state: Arc<FakeChildState>,
}

impl FakeChild {
    pub fn signals(&self) -> Vec<Signal> {
        self.state.signals.lock().clone()
    }

    pub fn has_exited(&self) -> bool {
        self.state.exited.load(Ordering::SeqCst)
    }
}

impl ChildProcess for FakeChild {
    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }

    async fn signal(&self, signal: Signal) -> Result<()> {
        self.state.signals.lock().push(signal);
        match (self.state.behavior, signal) {
            (ChildBehavior::Unsignalable, _) => Err(Error::ProcessTerminationIncomplete {
                pid: self.pid,
                reason: "operation not permitted".to_string(),
            }),
            (ChildBehavior::Graceful, _) | (ChildBehavior::Stubborn, Signal::Kill) => {
                self.state.exited.store(true, Ordering::SeqCst);
                Ok(())
            }
            (ChildBehavior::Stubborn, Signal::Terminate) => Ok(()),
        }
    }

    async fn wait_for_exit(&self, timeout: Duration) -> bool {
        if self.has_exited() {
            return true;
        }
        tokio::time::sleep(timeout).await;
        self.has_exited()
    }
}

/// Spawner that hands out [`FakeChild`]s and remembers every launch.
#[derive(Default)]
pub struct FakeSpawner {
    behaviors: Mutex<HashMap<String, ChildBehavior>>,
    failing: Mutex<Vec<String>>,
    spawned: Mutex<Vec<(String, Vec<String>, FakeChild)>>,
}

impl FakeSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Children whose arguments mention `deployment` get `behavior`.
    pub fn behave(&self, deployment: &str, behavior: ChildBehavior) {
        self.behaviors.lock().insert(deployment.to_string(), behavior);
    }

    /// Spawning for `deployment` fails.
    pub fn fail_for(&self, deployment: &str) {
        self.failing.lock().push(deployment.to_string());
    }

    pub fn spawned_args(&self) -> Vec<Vec<String>> {
        self.spawned.lock().iter().map(|(_, a, _)| a.clone()).collect()
    }

    pub fn child_for(&self, deployment: &str) -> Option<FakeChild> {
        self.spawned
            .lock()
            .iter()
            .find(|(_, args, _)| args.iter().any(|a| a == deployment))
            .map(|(_, _, c)| c.clone())
    }
}

impl Spawner for FakeSpawner {
    type Child = FakeChild;

    fn spawn(&self, program: &Path, args: &[String]) -> Result<FakeChild> {
        let rendered = render_command(program, &args.iter().map(String::as_str).collect::<Vec<_>>());
        if self
            .failing
            .lock()
            .iter()
            .any(|d| args.iter().any(|a| a == d))
        {
            return Err(Error::CommandFailed {
                command: rendered,
                message: "spawn refused".to_string(),
            });
        }

        let behavior = self
            .behaviors
            .lock()
            .iter()
            .find(|(d, _)| args.iter().any(|a| a == *d))
            .map(|(_, b)| *b)
            .unwrap_or(ChildBehavior::Graceful);

        let mut spawned = self.spawned.lock();
        let child = FakeChild {
            pid: 40_000 + spawned.len() as u32,
            state: Arc::new(FakeChildState {
                behavior,
                exited: AtomicBool::new(false),
                signals: Mutex::new(Vec::new()),
            }),
        };
        spawned.push((rendered, args.to_vec(), child.clone()));
        Ok(child)
    }
}

impl Spawner for Arc<FakeSpawner> {
    type Child = FakeChild;

    fn spawn(&self, program: &Path, args: &[String]) -> Result<FakeChild> {
        (**self).spawn(program, args)
    }
}
