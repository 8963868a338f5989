//! Connection Retry
//!
//! Walks the port rotation table against a tunnel engine. The engine
//! itself (OpenVPN, WireGuard) is a black box: this module only hands it
//! a constraint-satisfying (server, port) pair and moves to the next port
//! of the same protocol when the attempt fails.

use crate::model::{Protocol, Server, ServerType};
use crate::port::Port;
use crate::repository::ServersRepository;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, warn};

/// Tunnel engine failure
#[derive(Debug, Clone, thiserror::Error)]
pub enum TunnelError {
    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("Endpoint unreachable: {0}")]
    Unreachable(String),
}

/// Retry errors
#[derive(Debug, thiserror::Error)]
pub enum RetryError {
    #[error("No server available for {0}")]
    NoServer(ServerType),

    #[error("All {attempts} ports failed, last error: {last}")]
    Exhausted { attempts: usize, last: TunnelError },
}

/// Everything an engine needs to bring a tunnel up
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionTarget {
    pub protocol: Protocol,
    pub entry: Server,
    /// Second hop, present only in multi-hop sessions
    pub exit: Option<Server>,
    pub port: Port,
}

/// Tunnel engine boundary
#[async_trait]
pub trait TunnelEngine: Send + Sync {
    async fn connect(&self, target: &ConnectionTarget) -> Result<(), TunnelError>;
    async fn disconnect(&self);
}

/// Cursor over one protocol's ports, starting anywhere in the cycle
#[derive(Debug, Clone)]
pub struct ConnectionRetry {
    start: Port,
    current: Port,
    attempts: usize,
    delay: Duration,
}

impl ConnectionRetry {
    pub fn new(start: Port) -> Self {
        Self {
            start,
            current: start,
            attempts: 0,
            delay: Duration::from_secs(1),
        }
    }

    /// Pause between failed attempts
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn current(&self) -> Port {
        self.current
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }

    /// Record a failure on the current port and move on.
    ///
    /// Returns `None` once every port of the protocol has been tried.
    pub fn advance(&mut self) -> Option<Port> {
        self.attempts += 1;
        let next = self.current.next();
        if next == self.start {
            return None;
        }
        self.current = next;
        Some(next)
    }
}

/// Connect using the repository's current selection, rotating ports on
/// failure. `preferred` is ignored when it belongs to another protocol.
pub async fn connect_with_retry<E>(
    engine: &E,
    repository: &ServersRepository,
    preferred: Option<Port>,
    delay: Duration,
) -> Result<ConnectionTarget, RetryError>
where
    E: TunnelEngine + ?Sized,
{
    let protocol = repository.settings().protocol();
    let start = preferred
        .filter(|port| port.protocol() == protocol)
        .unwrap_or_else(|| Port::default_for(protocol));

    let entry = repository
        .current_server(ServerType::Entry)
        .ok_or(RetryError::NoServer(ServerType::Entry))?;
    let exit = if repository.settings().is_multi_hop_enabled() {
        Some(
            repository
                .current_server(ServerType::Exit)
                .ok_or(RetryError::NoServer(ServerType::Exit))?,
        )
    } else {
        None
    };

    let mut retry = ConnectionRetry::new(start).with_delay(delay);
    loop {
        let target = ConnectionTarget {
            protocol,
            entry: entry.clone(),
            exit: exit.clone(),
            port: retry.current(),
        };

        match engine.connect(&target).await {
            Ok(()) => {
                info!("Connected to {} on {}", target.entry.gateway, target.port);
                return Ok(target);
            }
            Err(e) => {
                warn!("Connection on {} failed: {}", target.port, e);
                if retry.advance().is_none() {
                    return Err(RetryError::Exhausted {
                        attempts: retry.attempts(),
                        last: e,
                    });
                }
                if !retry.delay.is_zero() {
                    tokio::time::sleep(retry.delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_cycle_from_middle() {
        let mut retry = ConnectionRetry::new(Port::Tcp443);
        let mut seen = vec![retry.current()];
        while let Some(port) = retry.advance() {
            seen.push(port);
        }

        assert_eq!(seen.len(), Port::values_for(Protocol::OpenVpn).len());
        assert_eq!(seen[0], Port::Tcp443);
        assert_eq!(seen[3], Port::Udp2049);
        assert_eq!(retry.attempts(), 7);
    }

    #[test]
    fn test_wireguard_cycle_stays_in_protocol() {
        let mut retry = ConnectionRetry::new(Port::WgUdp2050);
        while let Some(port) = retry.advance() {
            assert_eq!(port.protocol(), Protocol::WireGuard);
        }
        assert_eq!(retry.attempts(), 8);
    }
}
