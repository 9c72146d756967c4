//! `stagehand status` — live state of declared services.

use std::path::Path;
use std::process::ExitCode;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use colored::{ColoredString, Colorize};
use tabled::{settings::Style, Table, Tabled};

use stagehand_supervisor::{PortCheck, ServiceState, StatusReport, SupervisorError};

use crate::commands::{
    block_on, open_session, print_json, print_load_warnings, refuse, selected_services,
};

/// Arguments for `stagehand status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Services to report (default: every declared service).
    pub services: Vec<String>,

    /// Emit JSON instead of a table.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
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

        let names = match selected_services(&session, &self.services) {
            Ok(names) => names,
            Err(message) => return refuse(message),
        };

        let supervisor = session.supervisor(&resolution)?;
        let reports = block_on(async {
            if names.is_empty() {
                Ok(supervisor.status_all().await)
            } else {
                let mut reports = Vec::with_capacity(names.len());
                for name in &names {
                    reports.push(supervisor.status(name).await?);
                }
                Ok::<_, SupervisorError>(reports)
            }
        })??;

        if self.json {
            print_json(&reports)?;
            return Ok(ExitCode::SUCCESS);
        }

        println!("{} {}", "stagehand".bold(), env!("CARGO_PKG_VERSION"));
        println!("{}", summarize(&reports));
        println!();

        let rows: Vec<StatusRow> = reports.iter().map(StatusRow::from_report).collect();
        if rows.is_empty() {
            println!("no services declared");
        } else {
            println!("{}", Table::new(rows).with(Style::rounded()));
        }
        Ok(ExitCode::SUCCESS)
    }
}

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = " ")]
    indicator: String,
    #[tabled(rename = "Service")]
    service: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "PID")]
    pid: String,
    #[tabled(rename = "Health")]
    health: String,
    #[tabled(rename = "Ports")]
    ports: String,
    #[tabled(rename = "Uptime")]
    uptime: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

impl StatusRow {
    fn from_report(report: &StatusReport) -> Self {
        Self {
            indicator: state_indicator(report.state).to_string(),
            service: report.service.to_string(),
            state: state_label(report.state).to_string(),
            pid: report
                .pid
                .map(|pid| pid.to_string())
                .unwrap_or_else(|| "-".into()),
            health: match report.healthy {
                Some(true) => "ok".green().to_string(),
                Some(false) => "degraded".red().to_string(),
                None => "-".into(),
            },
            ports: ports_cell(&report.ports),
            uptime: report
                .started_at
                .map(format_age)
                .unwrap_or_else(|| "-".into()),
            detail: report.detail.clone().unwrap_or_default(),
        }
    }
}

fn ports_cell(checks: &[PortCheck]) -> String {
    if checks.is_empty() {
        return "-".into();
    }
    checks
        .iter()
        .map(|check| {
            if check.reachable {
                format!("{} {}", check.port, "open".green())
            } else {
                format!("{} {}", check.port, "down".red())
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn state_indicator(state: ServiceState) -> ColoredString {
    match state {
        ServiceState::Running => "●".green(),
        ServiceState::Starting => "◐".yellow(),
        ServiceState::Stopped => "○".bright_black(),
        ServiceState::Failed => "●".red(),
        ServiceState::Unknown => "?".magenta(),
    }
}

fn state_label(state: ServiceState) -> ColoredString {
    match state {
        ServiceState::Running => "running".green(),
        ServiceState::Starting => "starting".yellow(),
        ServiceState::Stopped => "stopped".bright_black(),
        ServiceState::Failed => "failed".red().bold(),
        ServiceState::Unknown => "unknown".magenta(),
    }
}

fn summarize(reports: &[StatusReport]) -> String {
    if reports.is_empty() {
        return "no services declared".into();
    }
    let count = |state: ServiceState| reports.iter().filter(|r| r.state == state).count();
    let mut parts = Vec::new();
    for (state, label) in [
        (ServiceState::Running, "running"),
        (ServiceState::Starting, "starting"),
        (ServiceState::Stopped, "stopped"),
        (ServiceState::Failed, "failed"),
        (ServiceState::Unknown, "unknown"),
    ] {
        let n = count(state);
        if n > 0 {
            parts.push(format!("{n} {label}"));
        }
    }
    parts.join(", ")
}

/// Compact age like `12s`, `4m 05s`, `3h 12m`, `2d 4h`.
fn format_age(since: DateTime<Utc>) -> String {
    let secs = (Utc::now() - since).num_seconds().max(0);
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else if secs < 86_400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86_400, (secs % 86_400) / 3600)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use stagehand_core::ServiceName;

    use super::*;

    fn report(name: &str, state: ServiceState) -> StatusReport {
        StatusReport {
            service: ServiceName::from(name),
            state,
            pid: None,
            healthy: None,
            ports: Vec::new(),
            started_at: None,
            detail: None,
        }
    }

    #[test]
    fn summary_counts_by_state() {
        let reports = vec![
            report("a", ServiceState::Running),
            report("b", ServiceState::Running),
            report("c", ServiceState::Stopped),
            report("d", ServiceState::Failed),
        ];
        assert_eq!(summarize(&reports), "2 running, 1 stopped, 1 failed");
        assert_eq!(summarize(&[]), "no services declared");
    }

    #[test]
    fn age_formatting_picks_sensible_units() {
        let now = Utc::now();
        assert_eq!(format_age(now), "0s");
        assert_eq!(format_age(now - chrono::Duration::seconds(59)), "59s");
        assert_eq!(format_age(now - chrono::Duration::seconds(90)), "1m 30s");
        assert_eq!(format_age(now - chrono::Duration::seconds(3 * 3600 + 720)), "3h 12m");
        assert_eq!(
            format_age(now - chrono::Duration::seconds(2 * 86_400 + 4 * 3600)),
            "2d 4h"
        );
    }

    #[test]
    fn future_started_at_clamps_to_zero() {
        let future = Utc::now() + chrono::Duration::seconds(120);
        assert_eq!(format_age(future), "0s");
    }

    #[test]
    fn port_cells_show_each_declared_port() {
        colored::control::set_override(false);
        let checks = [
            PortCheck {
                port: 8080,
                reachable: true,
            },
            PortCheck {
                port: 9090,
                reachable: false,
            },
        ];
        assert_eq!(ports_cell(&checks), "8080 open, 9090 down");
        assert_eq!(ports_cell(&[]), "-");
        colored::control::unset_override();
    }
}
