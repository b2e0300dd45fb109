// Two-phase connection health check

use std::net::SocketAddr;

use tokio::net::TcpStream;
use tracing::debug;

use super::{Session, Transport};
use crate::inventory::Host;
use crate::output::errors::TodError;

/// Checks reachability first, then the full session handshake
pub struct HealthChecker<'a> {
    transport: &'a dyn Transport,
}

impl<'a> HealthChecker<'a> {
    pub fn new(transport: &'a dyn Transport) -> Self {
        HealthChecker { transport }
    }

    /// Probe the host, then connect `session`. A failed probe never reaches
    /// the handshake.
    pub async fn check(&self, host: &Host, session: &mut dyn Session) -> Result<(), TodError> {
        self.transport.probe(host).await?;
        debug!(host = %host.name, "reachable");

        session.connect().await.map_err(|e| match e {
            TodError::Handshake { .. } => e,
            other => TodError::Handshake {
                host: host.name.clone(),
                message: other.reason().to_string(),
                suggestion: None,
            },
        })
    }
}

/// Address filter for a protocol name: `tcp` (any family), `tcp4` or `tcp6`
pub(crate) fn address_family(protocol: &str) -> Result<fn(&SocketAddr) -> bool, String> {
    match protocol {
        "tcp" => Ok(|_| true),
        "tcp4" => Ok(SocketAddr::is_ipv4),
        "tcp6" => Ok(SocketAddr::is_ipv6),
        other => Err(format!("Unsupported protocol '{}'", other)),
    }
}

/// Open and immediately drop a TCP connection to the host
///
/// A zero timeout leaves the probe unbounded.
pub async fn tcp_probe(host: &Host) -> Result<(), TodError> {
    let unreachable_err = |message: String| TodError::Reachability {
        host: host.name.clone(),
        message,
    };

    let family = address_family(&host.protocol).map_err(&unreachable_err)?;

    let address = host.address();
    let attempt = async {
        let addrs = tokio::net::lookup_host(address.as_str())
            .await
            .map_err(|e| unreachable_err(format!("Failed to resolve {}: {}", address, e)))?;

        let mut last_error = None;
        for addr in addrs.filter(family) {
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    drop(stream);
                    return Ok(());
                }
                Err(e) => last_error = Some(e),
            }
        }

        Err(unreachable_err(match last_error {
            Some(e) => format!("Connection to {} failed: {}", address, e),
            None => format!("No {} address found for {}", host.protocol, address),
        }))
    };

    if host.timeout.is_zero() {
        return attempt.await;
    }

    match tokio::time::timeout(host.timeout, attempt).await {
        Ok(result) => result,
        Err(_) => Err(unreachable_err(format!(
            "Connection to {} timed out after {}s",
            address,
            host.timeout.as_secs_f64()
        ))),
    }
}
