//! Error types for the kbridge-core library.

use thiserror::Error;

use crate::domain::AuthProvider;

/// Result type alias for kbridge operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while orchestrating connections and interceptions.
#[derive(Error, Debug)]
pub enum Error {
    /// A required external tool is not installed.
    #[error("{tool} is not installed or could not be found on PATH")]
    PrerequisiteMissing { tool: String },

    /// Cluster access needs an interactive login first.
    #[error("Cluster authentication required ({provider}): {hint}")]
    AuthenticationRequired { provider: AuthProvider, hint: String },

    /// No namespace connection is active.
    #[error("Not connected to a namespace")]
    NotConnected,

    /// No deployment matched the search term.
    #[error("No deployment matching '{search}' found in namespace '{namespace}'")]
    DeploymentNotFound { search: String, namespace: String },

    /// An interception session already exists for this deployment.
    #[error("An interception session already exists for '{0}'")]
    SessionAlreadyExists(String),

    /// No interception session is registered under this id.
    #[error("No interception session found for '{0}'")]
    SessionNotFound(String),

    /// An external command exited with a non-zero status.
    #[error("Command `{command}` failed: {message}")]
    CommandFailed { command: String, message: String },

    /// An external command did not finish in time.
    #[error("Command `{command}` timed out")]
    Timeout { command: String },

    /// A subprocess could not be confirmed terminated.
    #[error("Process {pid} may still be running: {reason}")]
    ProcessTerminationIncomplete { pid: u32, reason: String },

    /// Failed to parse command output.
    #[error("Failed to parse output: {0}")]
    ParseError(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Stderr fragments that mean the cluster wants an interactive login.
const AUTH_FAILURE_MARKERS: &[&str] = &[
    "unauthorized",
    "you must be logged in",
    "devicelogin",
    "interactive login",
    "token has expired",
    "refresh token",
    "failed to get token",
    "credentials have expired",
    "no valid credential",
    "az login",
    "gcloud auth login",
    "aws sso login",
];

/// Stderr fragments that mean the cluster is unreachable.
const UNREACHABLE_MARKERS: &[&str] = &[
    "connection refused",
    "no configuration has been provided",
    "dial tcp",
    "unable to connect to the server",
    "i/o timeout",
];

impl Error {
    /// Builds a `CommandFailed` from a rendered command line and its stderr.
    pub fn from_command_output(command: impl Into<String>, stderr: &str) -> Self {
        Error::CommandFailed {
            command: command.into(),
            message: stderr.trim().to_string(),
        }
    }

    /// Whether this error looks like the cluster asking for a fresh login.
    pub fn is_auth_failure(&self) -> bool {
        match self {
            Error::AuthenticationRequired { .. } => true,
            Error::CommandFailed { message, .. } => {
                let lower = message.to_lowercase();
                AUTH_FAILURE_MARKERS.iter().any(|m| lower.contains(m))
            }
            _ => false,
        }
    }

    /// Whether this error means the cluster API could not be reached at all.
    pub fn is_cluster_unreachable(&self) -> bool {
        match self {
            Error::Timeout { .. } => true,
            Error::CommandFailed { message, .. } => {
                let lower = message.to_lowercase();
                UNREACHABLE_MARKERS.iter().any(|m| lower.contains(m))
            }
            _ => false,
        }
    }

    /// Whether the error is a caller-input or state precondition failure.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Error::NotConnected
                | Error::DeploymentNotFound { .. }
                | Error::SessionAlreadyExists(_)
                | Error::SessionNotFound(_)
        )
    }
}
