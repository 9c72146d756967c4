//! `stagehand start` — launch services and wait for readiness.

use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use stagehand_supervisor::{StartOutcome, StartReport};

use crate::commands::{
    block_on, open_session, print_json, print_load_warnings, print_resolution_warnings, refuse,
    selected_services, EXIT_SERVICE,
};

/// Arguments for `stagehand start`.
#[derive(Args, Debug)]
pub struct StartArgs {
    /// Services to start (default: every declared service).
    pub services: Vec<String>,

    /// Whole-batch budget in seconds; unfinished services report `timed out`.
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Emit JSON reports instead of text lines.
    #[arg(long)]
    pub json: bool,
}

impl StartArgs {
    pub fn run(self, manifest: Option<&Path>) -> Result<ExitCode> {
        let session = match open_session(manifest)? {
            Ok(session) => session,
            Err(code) => return Ok(code),
        };
        print_load_warnings(&session);

        let resolution = match session.resolve() {
            Ok(resolution) => resolution,
            Err(err) => return refuse(err),
        };
        print_resolution_warnings(&resolution);
        if resolution.has_fatal_warnings() {
            return refuse("fatal configuration warnings; fix them before starting services");
        }

        let names = match selected_services(&session, &self.services) {
            Ok(names) => names,
            Err(message) => return refuse(message),
        };

        let supervisor = session.supervisor(&resolution)?;
        let budget = self.timeout.map(Duration::from_secs);
        let reports = block_on(supervisor.start(&names, budget))?;

        if self.json {
            print_json(&reports)?;
        } else {
            for report in &reports {
                println!("{}", start_line(report));
            }
        }

        if reports.iter().any(|report| report.outcome.is_failure()) {
            return Ok(ExitCode::from(EXIT_SERVICE));
        }
        Ok(ExitCode::SUCCESS)
    }
}

pub(crate) fn start_line(report: &StartReport) -> String {
    let (glyph, label) = match &report.outcome {
        StartOutcome::Started => ("✓".green(), "started".to_string()),
        StartOutcome::AlreadyRunning => ("·".bright_black(), "already running".to_string()),
        StartOutcome::Failed { reason } => ("✗".red(), format!("failed ({reason})")),
        StartOutcome::TimedOut => ("✗".red(), "timed out".to_string()),
    };
    format!("{glyph} {:<16} {label}", report.service)
}
