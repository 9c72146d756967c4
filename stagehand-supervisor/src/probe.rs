//! Readiness probing.

use std::path::Path;
use std::time::Duration;

use tokio::net::TcpStream;

use stagehand_core::{ProbeContext, ReadinessStrategy};

use crate::types::PortCheck;

const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

pub(crate) async fn port_open(port: u16) -> bool {
    let connect = TcpStream::connect(("127.0.0.1", port));
    matches!(tokio::time::timeout(CONNECT_TIMEOUT, connect).await, Ok(Ok(_)))
}

/// Probe every declared port once, in declaration order.
pub(crate) async fn check_ports(ports: &[u16]) -> Vec<PortCheck> {
    let mut checks = Vec::with_capacity(ports.len());
    for port in ports {
        checks.push(PortCheck {
            port: *port,
            reachable: port_open(*port).await,
        });
    }
    checks
}

/// One readiness check. `Ok(false)` means "not yet"; `Err` means the probe
/// itself cannot run and polling it again is pointless.
pub(crate) async fn check_ready(
    strategy: &ReadinessStrategy,
    ports: &[u16],
    rendered_pidfile: Option<&Path>,
    ctx: &ProbeContext<'_>,
) -> Result<bool, String> {
    match strategy {
        ReadinessStrategy::TcpPorts => {
            for port in ports {
                if !port_open(*port).await {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        ReadinessStrategy::PidFile { path } => match rendered_pidfile {
            Some(rendered) => Ok(rendered.exists()),
            None => Err(format!("pid-file path template `{path}` was not rendered")),
        },
        ReadinessStrategy::Custom { probe, .. } => probe(ctx),
    }
}
