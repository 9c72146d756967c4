//! Low-level process operations: spawning, pid records, and signals.
//!
//! A pid record is the supervisor's own note of what it launched, written
//! under `<state_dir>/run/`. It is deliberately not the same thing as a
//! service's own pid file (some services write one as a readiness signal);
//! the record is what lets a later CLI invocation find, probe, and stop a
//! process it did not spawn itself.

use std::fs;
use std::io;
use std::path::Path;
use std::process::Stdio;

use chrono::{DateTime, Utc};
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, Command};

use stagehand_render::InvocationSpec;

use crate::error::{io_err, SupervisorError};

/// What `kill(pid, 0)` told us about a recorded pid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Liveness {
    Alive,
    Gone,
    /// A process exists but belongs to another user.
    Denied,
}

pub(crate) fn liveness(pid: i32) -> Liveness {
    if pid <= 0 {
        return Liveness::Gone;
    }
    match kill(Pid::from_raw(pid), None) {
        Ok(()) => Liveness::Alive,
        Err(Errno::EPERM) => Liveness::Denied,
        _ => Liveness::Gone,
    }
}

pub(crate) fn send_signal(pid: i32, signal: Signal) -> Result<(), Errno> {
    kill(Pid::from_raw(pid), signal)
}

// ---------------------------------------------------------------------------
// Pid records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PidRecord {
    Missing,
    Pid(i32),
    /// The file exists but does not hold a pid.
    Garbage,
}

pub(crate) fn read_record(path: &Path) -> Result<PidRecord, SupervisorError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(PidRecord::Missing),
        Err(e) => return Err(io_err(path, e)),
    };
    match contents.trim().parse::<i32>() {
        Ok(pid) if pid > 0 => Ok(PidRecord::Pid(pid)),
        _ => Ok(PidRecord::Garbage),
    }
}

pub(crate) fn write_record(path: &Path, pid: i32) -> Result<(), SupervisorError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    fs::write(path, format!("{pid}\n")).map_err(|e| io_err(path, e))?;
    tracing::debug!("recorded pid {} at {}", pid, path.display());
    Ok(())
}

pub(crate) fn remove_record(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("failed to remove pid record {}: {e}", path.display()),
    }
}

/// Launch time for an adopted process, approximated by when the record was
/// written.
pub(crate) fn record_mtime(path: &Path) -> Option<DateTime<Utc>> {
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    Some(DateTime::<Utc>::from(modified))
}

// ---------------------------------------------------------------------------
// Spawning
// ---------------------------------------------------------------------------

/// Spawn the expanded command with both stdout and stderr appended to the
/// service log. The child is not killed on drop; it must outlive the CLI.
pub(crate) fn spawn(spec: &InvocationSpec, log_path: &Path) -> Result<Child, SupervisorError> {
    let (program, args) = match spec.argv.split_first() {
        Some(split) => split,
        None => {
            return Err(io_err(
                log_path,
                io::Error::new(io::ErrorKind::InvalidInput, "service command is empty"),
            ));
        }
    };

    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let log = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .map_err(|e| io_err(log_path, e))?;
    let log_err = log.try_clone().map_err(|e| io_err(log_path, e))?;

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(log_err))
        .envs(&spec.env);
    if let Some(cwd) = &spec.cwd {
        command.current_dir(cwd);
    }

    let child = command
        .spawn()
        .map_err(|e| io_err(program.as_str(), e))?;
    tracing::info!(
        program = %program,
        pid = child.id().unwrap_or_default(),
        "spawned service process"
    );
    Ok(child)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn record_round_trip() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("run").join("web.pid");

        write_record(&path, 4242).expect("write");
        assert_eq!(read_record(&path).expect("read"), PidRecord::Pid(4242));

        remove_record(&path);
        assert_eq!(read_record(&path).expect("read"), PidRecord::Missing);
    }

    #[test]
    fn garbage_record_is_flagged_not_fatal() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("web.pid");
        fs::write(&path, "not a pid\n").expect("write");
        assert_eq!(read_record(&path).expect("read"), PidRecord::Garbage);

        fs::write(&path, "-7\n").expect("write");
        assert_eq!(
            read_record(&path).expect("read"),
            PidRecord::Garbage,
            "non-positive pids are never valid records"
        );
    }

    #[test]
    fn own_pid_is_alive() {
        let pid = std::process::id() as i32;
        assert_eq!(liveness(pid), Liveness::Alive);
    }

    #[test]
    fn absurd_pid_is_gone() {
        assert_eq!(liveness(0), Liveness::Gone);
        // Above any plausible pid_max.
        assert_eq!(liveness(i32::MAX), Liveness::Gone);
    }
}
