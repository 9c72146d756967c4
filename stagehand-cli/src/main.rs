//! Stagehand — layered startup properties and multi-service supervision.
//!
//! Subcommands:
//! - `set` / `unset` / `show` — administrator overrides and resolved config
//! - `start` / `stop` / `restart` / `status` — process supervision
//!
//! Exit codes: 0 on success, 1 on unexpected errors, 2 on configuration or
//! validation problems, 3 when a requested service failed to start or stop.

mod commands;
mod hooks;
mod manifest;
mod session;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colored::Colorize;

use commands::restart::RestartArgs;
use commands::set::SetArgs;
use commands::show::ShowArgs;
use commands::start::StartArgs;
use commands::status::StatusArgs;
use commands::stop::StopArgs;
use commands::unset::UnsetArgs;

#[derive(Parser, Debug)]
#[command(
    name = "stagehand",
    version,
    about = "Configure and supervise a bundle of local services"
)]
struct Cli {
    /// Manifest path (overrides $STAGEHAND_MANIFEST and ./stagehand.yaml).
    #[arg(long, global = true, value_name = "PATH")]
    manifest: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Set an administrator override for a property.
    Set(SetArgs),
    /// Remove an administrator override, restoring the default.
    Unset(UnsetArgs),
    /// Show resolved properties, their sources, and warnings.
    Show(ShowArgs),
    /// Start services and wait for readiness.
    Start(StartArgs),
    /// Stop services, escalating from SIGTERM to SIGKILL.
    Stop(StopArgs),
    /// Stop services, then start them again.
    Restart(RestartArgs),
    /// Report the live state of services.
    Status(StatusArgs),
}

fn main() -> ExitCode {
    init_tracing();
    let Cli { manifest, command } = Cli::parse();
    let manifest = manifest.as_deref();

    let result = match command {
        Commands::Set(args) => args.run(manifest),
        Commands::Unset(args) => args.run(manifest),
        Commands::Show(args) => args.run(manifest),
        Commands::Start(args) => args.run(manifest),
        Commands::Stop(args) => args.run(manifest),
        Commands::Restart(args) => args.run(manifest),
        Commands::Status(args) => args.run(manifest),
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

/// Tracing goes to stderr so stdout stays parseable; quiet unless RUST_LOG
/// asks for more.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
