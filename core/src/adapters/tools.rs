//! Locating the external CLIs the orchestrator drives.

use std::path::PathBuf;

use crate::config::Settings;
use crate::error::{Error, Result};

pub const TELEPRESENCE: &str = "telepresence";
pub const KUBECTL: &str = "kubectl";

/// Default paths to search for telepresence.
const TELEPRESENCE_PATHS: &[&str] = &[
    "/opt/homebrew/bin/telepresence", // Apple Silicon
    "/usr/local/bin/telepresence",    // Intel Mac / Homebrew / install script
    "/usr/bin/telepresence",          // System
];

/// Default paths to search for kubectl.
const KUBECTL_PATHS: &[&str] = &[
    "/opt/homebrew/bin/kubectl", // Apple Silicon
    "/usr/local/bin/kubectl",    // Intel Mac / Homebrew
    "/usr/bin/kubectl",          // System
];

/// Resolved locations of the interception CLI and the cluster CLI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolPaths {
    telepresence: Option<PathBuf>,
    kubectl: Option<PathBuf>,
}

impl ToolPaths {
    /// Resolves both tools from settings overrides, `PATH`, then well-known locations.
    pub fn discover(settings: &Settings) -> Self {
        Self {
            telepresence: resolve(settings.telepresence_path.as_ref(), TELEPRESENCE, TELEPRESENCE_PATHS),
            kubectl: resolve(settings.kubectl_path.as_ref(), KUBECTL, KUBECTL_PATHS),
        }
    }

    /// Creates tool paths with explicit locations.
    pub fn with_paths(telepresence: Option<PathBuf>, kubectl: Option<PathBuf>) -> Self {
        Self {
            telepresence,
            kubectl,
        }
    }

    pub fn telepresence(&self) -> Result<&PathBuf> {
        self.telepresence
            .as_ref()
            .ok_or_else(|| Error::PrerequisiteMissing {
                tool: TELEPRESENCE.to_string(),
            })
    }

    pub fn kubectl(&self) -> Result<&PathBuf> {
        self.kubectl.as_ref().ok_or_else(|| Error::PrerequisiteMissing {
            tool: KUBECTL.to_string(),
        })
    }

    /// Fails with `PrerequisiteMissing` naming the first absent tool.
    pub fn require_all(&self) -> Result<()> {
        self.telepresence()?;
        self.kubectl()?;
        Ok(())
    }
}

fn resolve(explicit: Option<&PathBuf>, name: &str, fallbacks: &[&str]) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.clone());
    }

    which::which(name)
        .ok()
        .or_else(|| find_executable(fallbacks))
}

/// Finds an executable in the given paths.
fn find_executable(paths: &[&str]) -> Option<PathBuf> {
    paths.iter().map(PathBuf::from).find(|p| p.exists())
}
