//! Command runner port (interface).

use std::path::Path;

use crate::error::Result;

/// Port for running a single external command to completion.
///
/// Implementations own shell/platform details and must bound every call
/// with a timeout.
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args` and return its captured stdout.
    ///
    /// A non-zero exit is reported as `Error::CommandFailed`.
    fn run(
        &self,
        program: &Path,
        args: &[&str],
    ) -> impl std::future::Future<Output = Result<String>> + Send;
}

/// Renders a command line for logs and error messages.
pub fn render_command(program: &Path, args: &[&str]) -> String {
    let name = program
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.display().to_string());

    if args.is_empty() {
        name
    } else {
        format!("{} {}", name, args.join(" "))
    }
}
