//! Subcommand implementations and the bits they share.

pub mod restart;
pub mod set;
pub mod show;
pub mod start;
pub mod status;
pub mod stop;
pub mod unset;

use std::fmt;
use std::future::Future;
use std::process::ExitCode;

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;

use stagehand_core::{Resolution, ServiceName};

use crate::session::Session;

/// Configuration or validation problems: unknown names, ill-typed values,
/// manifest errors, fatal resolution warnings.
pub(crate) const EXIT_VALIDATION: u8 = 2;
/// A requested service failed to start or stop.
pub(crate) const EXIT_SERVICE: u8 = 3;

/// Print a validation complaint and return the validation exit code.
pub(crate) fn refuse(message: impl fmt::Display) -> Result<ExitCode> {
    eprintln!("{} {message}", "error:".red().bold());
    Ok(ExitCode::from(EXIT_VALIDATION))
}

/// Open the session, downgrading failures to the validation exit code.
pub(crate) fn open_session(manifest: Option<&std::path::Path>) -> Result<Result<Session, ExitCode>> {
    match Session::open(manifest) {
        Ok(session) => Ok(Ok(session)),
        Err(err) => refuse(format!("{err:#}")).map(Err),
    }
}

/// Surface notes about saved overrides that no longer apply.
pub(crate) fn print_load_warnings(session: &Session) {
    for warning in &session.load_warnings {
        eprintln!("{} {warning}", "warning:".yellow().bold());
    }
}

/// Surface every resolution warning; fatal ones get the louder label.
pub(crate) fn print_resolution_warnings(resolution: &Resolution) {
    for warning in &resolution.warnings {
        let label = if warning.fatal {
            "fatal:".red().bold()
        } else {
            "warning:".yellow().bold()
        };
        eprintln!("{label} {warning}");
    }
}

/// Map requested names to typed service names, rejecting undeclared ones.
/// An empty request selects every declared service.
pub(crate) fn selected_services(
    session: &Session,
    requested: &[String],
) -> std::result::Result<Vec<ServiceName>, String> {
    let unknown: Vec<&str> = requested
        .iter()
        .filter(|name| !session.services.iter().any(|s| s.name.as_ref() == name.as_str()))
        .map(String::as_str)
        .collect();
    if !unknown.is_empty() {
        let declared: Vec<&str> = session.services.iter().map(|s| s.name.as_ref()).collect();
        let hint = if declared.is_empty() {
            "the manifest declares no services".to_string()
        } else {
            format!("declared services: {}", declared.join(", "))
        };
        return Err(format!("unknown service `{}` ({hint})", unknown.join("`, `")));
    }
    Ok(requested.iter().map(|name| ServiceName::from(name.as_str())).collect())
}

/// Run a supervisor future to completion on a fresh runtime.
pub(crate) fn block_on<F: Future>(future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("could not start the async runtime")?;
    Ok(runtime.block_on(future))
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
