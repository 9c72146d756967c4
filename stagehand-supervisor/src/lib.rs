//! Multi-service process supervision for stagehand.
//!
//! The supervisor launches the services a manifest declares, confirms
//! readiness through pluggable probes, and stops them with a
//! SIGTERM-then-SIGKILL escalation. Every request is bounded: readiness
//! waits, stop grace, and whole-batch budgets all expire into explicit
//! outcomes instead of hanging.
//!
//! Key entry points:
//! - [`ProcessSupervisor`] — start / stop / status / status_all
//! - [`SupervisorConfig`] — state directory and timeout tuning
//! - [`StartOutcome`] / [`StopOutcome`] / [`StatusReport`] — per-service results

pub mod error;
pub mod paths;
mod probe;
mod process;
pub mod supervisor;
pub mod types;

pub use error::SupervisorError;
pub use supervisor::ProcessSupervisor;
pub use types::{
    PortCheck, ServiceState, StartOutcome, StartReport, StatusReport, StopOutcome, StopReport,
    SupervisorConfig,
};
