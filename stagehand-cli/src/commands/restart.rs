//! `stagehand restart` — stop services, then start them again.

use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use stagehand_supervisor::{StartReport, StopReport};

use crate::commands::{
    block_on, open_session, print_json, print_load_warnings, print_resolution_warnings, refuse,
    selected_services, EXIT_SERVICE,
};

/// Arguments for `stagehand restart`.
#[derive(Args, Debug)]
pub struct RestartArgs {
    /// Services to restart (default: every declared service).
    pub services: Vec<String>,

    /// Budget in seconds, applied to the stop and start phases separately.
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Emit JSON reports instead of text lines.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct RestartReport {
    stopped: Vec<StopReport>,
    started: Vec<StartReport>,
}

impl RestartArgs {
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
        let report = block_on(async {
            let stopped = supervisor.stop(&names, budget).await;
            let started = supervisor.start(&names, budget).await;
            RestartReport { stopped, started }
        })?;

        if self.json {
            print_json(&report)?;
        } else {
            for stop in &report.stopped {
                println!("{}", super::stop::stop_line(stop));
            }
            for start in &report.started {
                println!("{}", super::start::start_line(start));
            }
        }

        let failed = report.stopped.iter().any(|r| r.outcome.is_failure())
            || report.started.iter().any(|r| r.outcome.is_failure());
        if failed {
            return Ok(ExitCode::from(EXIT_SERVICE));
        }
        Ok(ExitCode::SUCCESS)
    }
}
