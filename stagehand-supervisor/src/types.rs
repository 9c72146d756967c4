//! Observable state and per-service request outcomes.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stagehand_core::ServiceName;

use crate::paths::{DEFAULT_POLL_INTERVAL, DEFAULT_READY_TIMEOUT, DEFAULT_STOP_GRACE};

/// Lifecycle state of one supervised service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    #[default]
    Stopped,
    Starting,
    Running,
    Failed,
    /// The record points at a process this user cannot inspect, or the
    /// record itself is unreadable.
    Unknown,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceState::Stopped => "stopped",
            ServiceState::Starting => "starting",
            ServiceState::Running => "running",
            ServiceState::Failed => "failed",
            ServiceState::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// What one start request did for one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "result")]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
    Failed { reason: String },
    /// The batch deadline expired before this service confirmed readiness.
    TimedOut,
}

impl StartOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, StartOutcome::Failed { .. } | StartOutcome::TimedOut)
    }
}

impl fmt::Display for StartOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartOutcome::Started => f.write_str("started"),
            StartOutcome::AlreadyRunning => f.write_str("already running"),
            StartOutcome::Failed { reason } => write!(f, "failed: {reason}"),
            StartOutcome::TimedOut => f.write_str("timed out"),
        }
    }
}

/// What one stop request did for one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "result")]
pub enum StopOutcome {
    Stopped,
    /// SIGTERM was not enough; the process only went away after SIGKILL.
    Killed,
    WasNotRunning,
    Failed { reason: String },
    TimedOut,
}

impl StopOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, StopOutcome::Failed { .. } | StopOutcome::TimedOut)
    }
}

impl fmt::Display for StopOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopOutcome::Stopped => f.write_str("stopped"),
            StopOutcome::Killed => f.write_str("killed"),
            StopOutcome::WasNotRunning => f.write_str("was not running"),
            StopOutcome::Failed { reason } => write!(f, "failed: {reason}"),
            StopOutcome::TimedOut => f.write_str("timed out"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartReport {
    pub service: ServiceName,
    #[serde(flatten)]
    pub outcome: StartOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StopReport {
    pub service: ServiceName,
    #[serde(flatten)]
    pub outcome: StopOutcome,
}

/// Reachability of one declared port, re-probed at status time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PortCheck {
    pub port: u16,
    pub reachable: bool,
}

/// Point-in-time view of one service.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub service: ServiceName,
    pub state: ServiceState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<i32>,
    /// Whether the readiness probe passes right now. `None` when the
    /// service is not running, so there is nothing to probe.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub healthy: Option<bool>,
    /// Per-port reachability for a running service. A running process with
    /// an unreachable port shows up here, not as `Failed`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<PortCheck>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Tunables for one supervisor instance.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Root for pid records, ready markers, and service logs.
    pub state_dir: PathBuf,
    pub ready_timeout: Duration,
    pub stop_grace: Duration,
    pub poll_interval: Duration,
}

impl SupervisorConfig {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
            ready_timeout: DEFAULT_READY_TIMEOUT,
            stop_grace: DEFAULT_STOP_GRACE,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_display_is_lowercase() {
        assert_eq!(ServiceState::Running.to_string(), "running");
        assert_eq!(ServiceState::Stopped.to_string(), "stopped");
    }

    #[test]
    fn outcome_failure_classification() {
        assert!(StartOutcome::TimedOut.is_failure());
        assert!(StartOutcome::Failed {
            reason: "x".into()
        }
        .is_failure());
        assert!(!StartOutcome::Started.is_failure());
        assert!(!StartOutcome::AlreadyRunning.is_failure());
        assert!(!StopOutcome::WasNotRunning.is_failure());
        assert!(!StopOutcome::Killed.is_failure());
    }

    #[test]
    fn start_report_serializes_flat() {
        let report = StartReport {
            service: ServiceName::from("web"),
            outcome: StartOutcome::Failed {
                reason: "exited early".into(),
            },
        };
        let json = serde_json::to_value(&report).expect("serialize");
        assert_eq!(json["service"], "web");
        assert_eq!(json["result"], "failed");
        assert_eq!(json["reason"], "exited early");
    }
}
