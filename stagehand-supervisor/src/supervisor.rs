//! The process supervisor: start, stop, and observe declared services.
//!
//! One supervisor instance covers one manifest's services and one state
//! directory. Requests for different services run in parallel; requests for
//! the same service serialize on a per-service lock, so overlapping batches
//! cannot interleave a single service's start/stop sequence.
//!
//! State is reconstructed on every request from two sources: a child handle
//! when this process did the spawning, and the pid record under
//! `<state_dir>/run/` otherwise. The supervisor therefore works across CLI
//! invocations — one `start` process may exit and a later `stop` process
//! will still find the service.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use nix::errno::Errno;
use nix::sys::signal::Signal;
use tokio::process::Child;
use tokio::sync::{Mutex, MutexGuard};
use tokio::task::JoinSet;
use tokio::time::Instant;

use stagehand_core::{ProbeContext, Resolution, ServiceDescriptor, ServiceName};
use stagehand_render::{expand, InvocationSpec};

use crate::error::SupervisorError;
use crate::paths;
use crate::probe;
use crate::process::{self, Liveness, PidRecord};
use crate::types::{
    ServiceState, StartOutcome, StartReport, StatusReport, StopOutcome, StopReport,
    SupervisorConfig,
};

pub struct ProcessSupervisor {
    inner: Arc<Inner>,
}

struct Inner {
    config: SupervisorConfig,
    services: BTreeMap<ServiceName, ServiceDescriptor>,
    resolution: Resolution,
    entries: Mutex<HashMap<ServiceName, Arc<Mutex<ServiceEntry>>>>,
}

/// Mutable per-service bookkeeping, guarded by a per-service lock.
#[derive(Default)]
struct ServiceEntry {
    child: Option<Child>,
    state: ServiceState,
    started_at: Option<chrono::DateTime<Utc>>,
}

/// What `refresh` learned about a service right now.
struct StateView {
    state: ServiceState,
    pid: Option<i32>,
    detail: Option<String>,
}

impl ProcessSupervisor {
    pub fn new(
        config: SupervisorConfig,
        services: impl IntoIterator<Item = ServiceDescriptor>,
        resolution: Resolution,
    ) -> Self {
        let services = services
            .into_iter()
            .map(|descriptor| (descriptor.name.clone(), descriptor))
            .collect();
        Self {
            inner: Arc::new(Inner {
                config,
                services,
                resolution,
                entries: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Declared service names, in manifest (sorted) order.
    pub fn service_names(&self) -> Vec<ServiceName> {
        self.inner.services.keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.services.contains_key(name)
    }

    /// Start the named services, or every declared service when `names` is
    /// empty. Returns one report per requested service, in request order.
    ///
    /// `budget` bounds the whole batch; a service that has not confirmed
    /// readiness when it expires reports [`StartOutcome::TimedOut`] and its
    /// process (if one was spawned) is left running for `status` to judge.
    pub async fn start(&self, names: &[ServiceName], budget: Option<Duration>) -> Vec<StartReport> {
        let targets = self.targets(names);
        let deadline = budget.map(|b| Instant::now() + b);
        let mut set = JoinSet::new();
        for (idx, name) in targets.iter().enumerate() {
            let inner = self.inner.clone();
            let name = name.clone();
            set.spawn(async move { (idx, start_one(&inner, name, deadline).await) });
        }
        collect_ordered(set, &targets, |service| StartReport {
            service,
            outcome: StartOutcome::Failed {
                reason: "start worker aborted".into(),
            },
        })
        .await
    }

    /// Stop the named services (all when empty). Stopping a service that is
    /// not running is a successful no-op.
    pub async fn stop(&self, names: &[ServiceName], budget: Option<Duration>) -> Vec<StopReport> {
        let targets = self.targets(names);
        let deadline = budget.map(|b| Instant::now() + b);
        let mut set = JoinSet::new();
        for (idx, name) in targets.iter().enumerate() {
            let inner = self.inner.clone();
            let name = name.clone();
            set.spawn(async move { (idx, stop_one(&inner, name, deadline).await) });
        }
        collect_ordered(set, &targets, |service| StopReport {
            service,
            outcome: StopOutcome::Failed {
                reason: "stop worker aborted".into(),
            },
        })
        .await
    }

    pub async fn status(&self, name: &ServiceName) -> Result<StatusReport, SupervisorError> {
        if !self.inner.services.contains_key(name) {
            return Err(SupervisorError::UnknownService { name: name.clone() });
        }
        Ok(status_one(&self.inner, name.clone()).await)
    }

    pub async fn status_all(&self) -> Vec<StatusReport> {
        let targets = self.targets(&[]);
        let mut set = JoinSet::new();
        for (idx, name) in targets.iter().enumerate() {
            let inner = self.inner.clone();
            let name = name.clone();
            set.spawn(async move { (idx, status_one(&inner, name).await) });
        }
        collect_ordered(set, &targets, |service| StatusReport {
            service,
            state: ServiceState::Unknown,
            pid: None,
            healthy: None,
            ports: Vec::new(),
            started_at: None,
            detail: Some("status worker aborted".into()),
        })
        .await
    }

    fn targets(&self, names: &[ServiceName]) -> Vec<ServiceName> {
        if names.is_empty() {
            self.service_names()
        } else {
            names.to_vec()
        }
    }
}

// ---------------------------------------------------------------------------
// Batch plumbing
// ---------------------------------------------------------------------------

async fn collect_ordered<T: 'static>(
    mut set: JoinSet<(usize, T)>,
    targets: &[ServiceName],
    missing: impl Fn(ServiceName) -> T,
) -> Vec<T> {
    let mut slots: Vec<Option<T>> = targets.iter().map(|_| None).collect();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((idx, report)) => {
                if let Some(slot) = slots.get_mut(idx) {
                    *slot = Some(report);
                }
            }
            Err(err) => tracing::error!("supervisor worker failed: {err}"),
        }
    }
    targets
        .iter()
        .cloned()
        .zip(slots)
        .map(|(service, slot)| slot.unwrap_or_else(|| missing(service)))
        .collect()
}

async fn entry_for(inner: &Inner, name: &ServiceName) -> Arc<Mutex<ServiceEntry>> {
    let mut entries = inner.entries.lock().await;
    entries.entry(name.clone()).or_default().clone()
}

async fn lock_entry<'a>(
    entry: &'a Mutex<ServiceEntry>,
    deadline: Option<Instant>,
) -> Option<MutexGuard<'a, ServiceEntry>> {
    match deadline {
        Some(limit) => tokio::time::timeout_at(limit, entry.lock()).await.ok(),
        None => Some(entry.lock().await),
    }
}

fn expired(deadline: Option<Instant>) -> bool {
    deadline.map_or(false, |limit| Instant::now() >= limit)
}

/// Sleep long enough to poll without overshooting either deadline.
fn poll_step(poll: Duration, deadline: Option<Instant>, local: Instant) -> Duration {
    let now = Instant::now();
    let mut step = poll.min(local.saturating_duration_since(now));
    if let Some(limit) = deadline {
        step = step.min(limit.saturating_duration_since(now));
    }
    step.max(Duration::from_millis(10))
}

// ---------------------------------------------------------------------------
// State refresh
// ---------------------------------------------------------------------------

/// Reconcile the entry with reality: poll an owned child, otherwise consult
/// the pid record. Stale and unreadable records are cleaned up here.
fn refresh(inner: &Inner, descriptor: &ServiceDescriptor, entry: &mut ServiceEntry) -> StateView {
    let record = paths::pid_record_path(&inner.config.state_dir, &descriptor.name);

    if let Some(child) = entry.child.as_mut() {
        match child.try_wait() {
            Ok(None) => {
                let pid = child.id().map(|p| p as i32);
                entry.state = ServiceState::Running;
                return StateView {
                    state: ServiceState::Running,
                    pid,
                    detail: None,
                };
            }
            Ok(Some(status)) => {
                let detail = format!("exited ({status})");
                entry.child = None;
                entry.state = ServiceState::Failed;
                entry.started_at = None;
                process::remove_record(&record);
                return StateView {
                    state: ServiceState::Failed,
                    pid: None,
                    detail: Some(detail),
                };
            }
            Err(err) => {
                let pid = child.id().map(|p| p as i32);
                entry.state = ServiceState::Unknown;
                return StateView {
                    state: ServiceState::Unknown,
                    pid,
                    detail: Some(format!("could not poll process: {err}")),
                };
            }
        }
    }

    match process::read_record(&record) {
        Ok(PidRecord::Missing) => {
            if entry.state != ServiceState::Failed {
                entry.state = ServiceState::Stopped;
                entry.started_at = None;
            }
            StateView {
                state: entry.state,
                pid: None,
                detail: None,
            }
        }
        Ok(PidRecord::Pid(pid)) => match process::liveness(pid) {
            Liveness::Alive => {
                entry.state = ServiceState::Running;
                if entry.started_at.is_none() {
                    entry.started_at = process::record_mtime(&record);
                }
                StateView {
                    state: ServiceState::Running,
                    pid: Some(pid),
                    detail: None,
                }
            }
            Liveness::Gone => {
                process::remove_record(&record);
                entry.state = ServiceState::Stopped;
                entry.started_at = None;
                StateView {
                    state: ServiceState::Stopped,
                    pid: None,
                    detail: Some("removed stale pid record".into()),
                }
            }
            Liveness::Denied => {
                entry.state = ServiceState::Unknown;
                StateView {
                    state: ServiceState::Unknown,
                    pid: Some(pid),
                    detail: Some(format!("pid {pid} exists but cannot be inspected")),
                }
            }
        },
        Ok(PidRecord::Garbage) => {
            process::remove_record(&record);
            entry.state = ServiceState::Stopped;
            entry.started_at = None;
            StateView {
                state: ServiceState::Stopped,
                pid: None,
                detail: Some("removed unreadable pid record".into()),
            }
        }
        Err(err) => {
            entry.state = ServiceState::Unknown;
            StateView {
                state: ServiceState::Unknown,
                pid: None,
                detail: Some(err.to_string()),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Start
// ---------------------------------------------------------------------------

async fn start_one(inner: &Inner, name: ServiceName, deadline: Option<Instant>) -> StartReport {
    let outcome = match inner.services.get(&name) {
        Some(descriptor) => start_service(inner, descriptor, deadline).await,
        None => StartOutcome::Failed {
            reason: format!("no service named `{name}`"),
        },
    };
    StartReport {
        service: name,
        outcome,
    }
}

async fn start_service(
    inner: &Inner,
    descriptor: &ServiceDescriptor,
    deadline: Option<Instant>,
) -> StartOutcome {
    if expired(deadline) {
        return StartOutcome::TimedOut;
    }
    let entry = entry_for(inner, &descriptor.name).await;
    let mut guard = match lock_entry(&entry, deadline).await {
        Some(guard) => guard,
        None => return StartOutcome::TimedOut,
    };

    let view = refresh(inner, descriptor, &mut guard);
    match view.state {
        ServiceState::Running => return StartOutcome::AlreadyRunning,
        ServiceState::Unknown => {
            return StartOutcome::Failed {
                reason: view
                    .detail
                    .unwrap_or_else(|| "service state is unknown".into()),
            };
        }
        _ => {}
    }

    let spec = match expand(descriptor, &inner.resolution) {
        Ok(spec) => spec,
        Err(err) => {
            guard.state = ServiceState::Failed;
            return StartOutcome::Failed {
                reason: err.to_string(),
            };
        }
    };

    if expired(deadline) {
        return StartOutcome::TimedOut;
    }

    let record = paths::pid_record_path(&inner.config.state_dir, &descriptor.name);
    let log = paths::log_path(&inner.config.state_dir, &descriptor.name);
    let child = match process::spawn(&spec, &log) {
        Ok(child) => child,
        Err(err) => {
            guard.state = ServiceState::Failed;
            return StartOutcome::Failed {
                reason: err.to_string(),
            };
        }
    };
    if let Some(pid) = child.id() {
        if let Err(err) = process::write_record(&record, pid as i32) {
            tracing::warn!(service = %descriptor.name, "could not write pid record: {err}");
        }
    }
    guard.state = ServiceState::Starting;
    guard.started_at = Some(Utc::now());
    guard.child = Some(child);

    wait_ready(inner, descriptor, &spec, deadline, &mut guard).await
}

async fn wait_ready(
    inner: &Inner,
    descriptor: &ServiceDescriptor,
    spec: &InvocationSpec,
    deadline: Option<Instant>,
    entry: &mut ServiceEntry,
) -> StartOutcome {
    let ready_timeout = descriptor.ready_timeout.unwrap_or(inner.config.ready_timeout);
    let ready_deadline = Instant::now() + ready_timeout;
    let record = paths::pid_record_path(&inner.config.state_dir, &descriptor.name);
    let ctx = ProbeContext {
        service: &descriptor.name,
        properties: &inner.resolution.properties,
        state_dir: &inner.config.state_dir,
    };

    loop {
        if let Some(child) = entry.child.as_mut() {
            match child.try_wait() {
                Ok(None) => {}
                Ok(Some(status)) => {
                    entry.child = None;
                    entry.state = ServiceState::Failed;
                    entry.started_at = None;
                    process::remove_record(&record);
                    return StartOutcome::Failed {
                        reason: format!("exited during startup ({status})"),
                    };
                }
                Err(err) => {
                    entry.state = ServiceState::Unknown;
                    return StartOutcome::Failed {
                        reason: format!("could not poll process: {err}"),
                    };
                }
            }
        }

        match probe::check_ready(
            &descriptor.readiness,
            &descriptor.ports,
            spec.ready_pidfile.as_deref(),
            &ctx,
        )
        .await
        {
            Ok(true) => {
                entry.state = ServiceState::Running;
                tracing::info!(service = %descriptor.name, "service is ready");
                return StartOutcome::Started;
            }
            Ok(false) => {}
            Err(message) => {
                entry.state = ServiceState::Unknown;
                return StartOutcome::Failed {
                    reason: format!("readiness probe error: {message}"),
                };
            }
        }

        let now = Instant::now();
        if let Some(limit) = deadline {
            if now >= limit {
                return StartOutcome::TimedOut;
            }
        }
        if now >= ready_deadline {
            return StartOutcome::Failed {
                reason: format!("not ready after {ready_timeout:?}; process left running"),
            };
        }
        tokio::time::sleep(poll_step(inner.config.poll_interval, deadline, ready_deadline)).await;
    }
}

// ---------------------------------------------------------------------------
// Stop
// ---------------------------------------------------------------------------

async fn stop_one(inner: &Inner, name: ServiceName, deadline: Option<Instant>) -> StopReport {
    let outcome = match inner.services.get(&name) {
        Some(descriptor) => stop_service(inner, descriptor, deadline).await,
        None => StopOutcome::Failed {
            reason: format!("no service named `{name}`"),
        },
    };
    StopReport {
        service: name,
        outcome,
    }
}

async fn stop_service(
    inner: &Inner,
    descriptor: &ServiceDescriptor,
    deadline: Option<Instant>,
) -> StopOutcome {
    if expired(deadline) {
        return StopOutcome::TimedOut;
    }
    let entry = entry_for(inner, &descriptor.name).await;
    let mut guard = match lock_entry(&entry, deadline).await {
        Some(guard) => guard,
        None => return StopOutcome::TimedOut,
    };

    let record = paths::pid_record_path(&inner.config.state_dir, &descriptor.name);
    let view = refresh(inner, descriptor, &mut guard);
    let pid = match (view.state, view.pid) {
        (ServiceState::Running, Some(pid)) => pid,
        (ServiceState::Running, None) => {
            // Child handle alive but already reaped out from under us.
            finish_stop(&mut guard, &record);
            return StopOutcome::Stopped;
        }
        (ServiceState::Unknown, _) => {
            return StopOutcome::Failed {
                reason: view
                    .detail
                    .unwrap_or_else(|| "service state is unknown".into()),
            };
        }
        _ => {
            guard.state = ServiceState::Stopped;
            return StopOutcome::WasNotRunning;
        }
    };

    tracing::info!(service = %descriptor.name, pid, "sending SIGTERM");
    match process::send_signal(pid, Signal::SIGTERM) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(errno) => {
            return StopOutcome::Failed {
                reason: format!("failed to signal pid {pid}: {errno}"),
            };
        }
    }

    let grace = descriptor.stop_grace.unwrap_or(inner.config.stop_grace);
    let grace_deadline = Instant::now() + grace;
    loop {
        tokio::time::sleep(poll_step(inner.config.poll_interval, deadline, grace_deadline)).await;
        if process_gone(&mut guard, pid) {
            finish_stop(&mut guard, &record);
            tracing::info!(service = %descriptor.name, "stopped");
            return StopOutcome::Stopped;
        }
        let now = Instant::now();
        if let Some(limit) = deadline {
            if now >= limit {
                return StopOutcome::TimedOut;
            }
        }
        if now >= grace_deadline {
            break;
        }
    }

    tracing::warn!(service = %descriptor.name, pid, "escalating to SIGKILL");
    match process::send_signal(pid, Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(errno) => {
            return StopOutcome::Failed {
                reason: format!("SIGKILL of pid {pid} failed: {errno}"),
            };
        }
    }

    let kill_deadline = Instant::now() + paths::KILL_CONFIRM_WAIT;
    loop {
        tokio::time::sleep(poll_step(inner.config.poll_interval, deadline, kill_deadline)).await;
        if process_gone(&mut guard, pid) {
            finish_stop(&mut guard, &record);
            return StopOutcome::Killed;
        }
        let now = Instant::now();
        if let Some(limit) = deadline {
            if now >= limit {
                return StopOutcome::TimedOut;
            }
        }
        if now >= kill_deadline {
            guard.state = ServiceState::Unknown;
            return StopOutcome::Failed {
                reason: format!("pid {pid} survived SIGKILL"),
            };
        }
    }
}

/// An owned child must be reaped through `try_wait`; an adopted pid can only
/// be probed with signal 0.
fn process_gone(entry: &mut ServiceEntry, pid: i32) -> bool {
    if let Some(child) = entry.child.as_mut() {
        match child.try_wait() {
            Ok(Some(_)) => {
                entry.child = None;
                true
            }
            Ok(None) => false,
            Err(_) => process::liveness(pid) == Liveness::Gone,
        }
    } else {
        process::liveness(pid) == Liveness::Gone
    }
}

fn finish_stop(entry: &mut ServiceEntry, record: &Path) {
    entry.child = None;
    entry.state = ServiceState::Stopped;
    entry.started_at = None;
    process::remove_record(record);
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

async fn status_one(inner: &Inner, name: ServiceName) -> StatusReport {
    let descriptor = match inner.services.get(&name) {
        Some(descriptor) => descriptor,
        None => {
            return StatusReport {
                service: name,
                state: ServiceState::Unknown,
                pid: None,
                healthy: None,
                ports: Vec::new(),
                started_at: None,
                detail: Some("not a declared service".into()),
            };
        }
    };

    let entry = entry_for(inner, &name).await;
    let mut guard = entry.lock().await;
    let view = refresh(inner, descriptor, &mut guard);
    let (healthy, ports) = match view.state {
        ServiceState::Running => (
            Some(health_check(inner, descriptor).await),
            probe::check_ports(&descriptor.ports).await,
        ),
        _ => (None, Vec::new()),
    };
    StatusReport {
        service: name,
        state: view.state,
        pid: view.pid,
        healthy,
        ports,
        started_at: guard.started_at,
        detail: view.detail,
    }
}

/// Re-run the readiness probe against a running service. A probe that cannot
/// run at all counts as unhealthy.
async fn health_check(inner: &Inner, descriptor: &ServiceDescriptor) -> bool {
    let rendered_pidfile = match expand(descriptor, &inner.resolution) {
        Ok(spec) => spec.ready_pidfile,
        Err(err) => {
            tracing::warn!(service = %descriptor.name, "health probe template error: {err}");
            return false;
        }
    };
    let ctx = ProbeContext {
        service: &descriptor.name,
        properties: &inner.resolution.properties,
        state_dir: &inner.config.state_dir,
    };
    match probe::check_ready(
        &descriptor.readiness,
        &descriptor.ports,
        rendered_pidfile.as_deref(),
        &ctx,
    )
    .await
    {
        Ok(ready) => ready,
        Err(message) => {
            tracing::warn!(service = %descriptor.name, "health probe error: {message}");
            false
        }
    }
}
