use std::path::{Path, PathBuf};
use std::time::Duration;

use stagehand_core::ServiceName;

pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(10);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// How long to wait for a process to disappear after SIGKILL.
pub const KILL_CONFIRM_WAIT: Duration = Duration::from_secs(2);

pub fn run_dir(state_dir: &Path) -> PathBuf {
    state_dir.join("run")
}

pub fn log_dir(state_dir: &Path) -> PathBuf {
    state_dir.join("log")
}

/// The supervisor's own record of a launched pid. Outlives the launching
/// process so a later invocation can adopt or stop the service.
pub fn pid_record_path(state_dir: &Path, service: &ServiceName) -> PathBuf {
    run_dir(state_dir).join(format!("{service}.pid"))
}

pub fn log_path(state_dir: &Path, service: &ServiceName) -> PathBuf {
    log_dir(state_dir).join(format!("{service}.log"))
}

/// Marker consumed by the built-in `ready_file` probe.
pub fn ready_marker_path(state_dir: &Path, service: &ServiceName) -> PathBuf {
    run_dir(state_dir).join(format!("{service}.ready"))
}
