//! `stagehand stop` — SIGTERM with a grace period, then SIGKILL.

use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use stagehand_supervisor::{StopOutcome, StopReport};

use crate::commands::{
    block_on, open_session, print_json, print_load_warnings, refuse, selected_services,
    EXIT_SERVICE,
};

/// Arguments for `stagehand stop`.
#[derive(Args, Debug)]
pub struct StopArgs {
    /// Services to stop (default: every declared service).
    pub services: Vec<String>,

    /// Whole-batch budget in seconds; unfinished services report `timed out`.
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Emit JSON reports instead of text lines.
    #[arg(long)]
    pub json: bool,
}

impl StopArgs {
    pub fn run(self, manifest: Option<&Path>) -> Result<ExitCode> {
        let session = match open_session(manifest)? {
            Ok(session) => session,
            Err(code) => return Ok(code),
        };
        print_load_warnings(&session);

        // Fatal warnings do not block stopping; a broken config must never
        // strand running processes. Resolution errors still do, because the
        // state directory may be property-addressed.
        let resolution = match session.resolve() {
            Ok(resolution) => resolution,
            Err(err) => return refuse(err),
        };

        let names = match selected_services(&session, &self.services) {
            Ok(names) => names,
            Err(message) => return refuse(message),
        };

        let supervisor = session.supervisor(&resolution)?;
        let budget = self.timeout.map(Duration::from_secs);
        let reports = block_on(supervisor.stop(&names, budget))?;

        if self.json {
            print_json(&reports)?;
        } else {
            for report in &reports {
                println!("{}", stop_line(report));
            }
        }

        if reports.iter().any(|report| report.outcome.is_failure()) {
            return Ok(ExitCode::from(EXIT_SERVICE));
        }
        Ok(ExitCode::SUCCESS)
    }
}

pub(crate) fn stop_line(report: &StopReport) -> String {
    let (glyph, label) = match &report.outcome {
        StopOutcome::Stopped => ("✓".green(), "stopped".to_string()),
        StopOutcome::Killed => ("✓".yellow(), "killed (needed SIGKILL)".to_string()),
        StopOutcome::WasNotRunning => ("·".bright_black(), "was not running".to_string()),
        StopOutcome::Failed { reason } => ("✗".red(), format!("failed ({reason})")),
        StopOutcome::TimedOut => ("✗".red(), "timed out".to_string()),
    };
    format!("{glyph} {:<16} {label}", report.service)
}
