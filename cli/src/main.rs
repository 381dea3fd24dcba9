//! KBridge CLI - Redirect a Kubernetes deployment's traffic to a local process
//!
//! A command-line front end for the interception orchestrator: connect to a
//! namespace, intercept deployments, and inspect or tear down interceptions.

mod commands;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "kbridge")]
#[command(author, version, about = "Redirect Kubernetes deployment traffic to a local process")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List cluster namespaces
    #[command(alias = "ns")]
    Namespaces,

    /// List deployments in a namespace
    Deployments {
        /// Namespace to query
        namespace: String,
    },

    /// Reconcile and show interception status
    #[command(alias = "st")]
    Status {
        /// Only show interceptions in this namespace
        #[arg(short, long)]
        namespace: Option<String>,
    },

    /// Intercept a deployment until Ctrl-C
    Intercept {
        /// Deployment name or part of it
        search: String,

        /// Namespace to connect to
        #[arg(short, long)]
        namespace: String,

        /// Local port that receives the traffic
        #[arg(short, long)]
        port: u16,
    },

    /// Stop intercepting a deployment
    Leave {
        /// Deployment name or part of it
        deployment: String,
    },

    /// Stop every interception and the daemon
    Disconnect,

    /// Show current configuration
    Config,
}

fn init_tracing(verbose: u8, quiet: bool) {
    let default_level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "kbridge=debug,kbridge_core=debug",
        (false, _) => "kbridge=trace,kbridge_core=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();
}

/// Exit status for a failed command: 2 for usage and state errors the user can
/// fix by changing the invocation, 1 for everything else.
fn failure_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<kbridge_core::Error>() {
        Some(core) if core.is_precondition() => 2,
        _ => 1,
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Namespaces => commands::cluster::namespaces(cli.json).await?,
        Commands::Deployments { namespace } => {
            commands::cluster::deployments(&namespace, cli.json).await?
        }
        Commands::Status { namespace } => {
            commands::status::run(namespace.as_deref(), cli.json).await?
        }
        Commands::Intercept {
            search,
            namespace,
            port,
        } => commands::intercept::run(&search, &namespace, port, cli.json).await?,
        Commands::Leave { deployment } => commands::leave::run(&deployment, cli.json).await?,
        Commands::Disconnect => commands::disconnect::run(cli.json).await?,
        Commands::Config => commands::config::show(cli.json).await?,
    }

    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(failure_code(&e))
        }
    }
}
