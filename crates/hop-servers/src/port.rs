//! Port Rotation Table
//!
//! Fixed, protocol-scoped list of (transport, port) candidates. A
//! connection retry loop steps through a protocol's ports with
//! [`Port::next`], wrapping back to the first one at the end.
//!
//! | Protocol  | Ports (rotation order)                                  |
//! |-----------|---------------------------------------------------------|
//! | OpenVPN   | UDP 2049, 2050, 53, 1194; TCP 443, 1443, 80             |
//! | WireGuard | UDP 53, 1194, 2049, 2050, 30587, 41893, 48574, 58237    |

use crate::model::Protocol;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Transport used by a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Transport {
    Udp,
    Tcp,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Udp => write!(f, "UDP"),
            Transport::Tcp => write!(f, "TCP"),
        }
    }
}

/// Candidate connection port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Port {
    Udp2049,
    Udp2050,
    Udp53,
    Udp1194,
    Tcp443,
    Tcp1443,
    Tcp80,
    WgUdp53,
    WgUdp1194,
    WgUdp2049,
    WgUdp2050,
    WgUdp30587,
    WgUdp41893,
    WgUdp48574,
    WgUdp58237,
}

const OPENVPN_PORTS: &[Port] = &[
    Port::Udp2049,
    Port::Udp2050,
    Port::Udp53,
    Port::Udp1194,
    Port::Tcp443,
    Port::Tcp1443,
    Port::Tcp80,
];

const WIREGUARD_PORTS: &[Port] = &[
    Port::WgUdp53,
    Port::WgUdp1194,
    Port::WgUdp2049,
    Port::WgUdp2050,
    Port::WgUdp30587,
    Port::WgUdp41893,
    Port::WgUdp48574,
    Port::WgUdp58237,
];

impl Port {
    /// Ordered candidates for a protocol
    pub fn values_for(protocol: Protocol) -> &'static [Port] {
        match protocol {
            Protocol::OpenVpn => OPENVPN_PORTS,
            Protocol::WireGuard => WIREGUARD_PORTS,
        }
    }

    /// Default port for a protocol (first candidate)
    pub fn default_for(protocol: Protocol) -> Port {
        Self::values_for(protocol)[0]
    }

    /// Transport of this port
    pub fn transport(&self) -> Transport {
        match self {
            Port::Tcp443 | Port::Tcp1443 | Port::Tcp80 => Transport::Tcp,
            _ => Transport::Udp,
        }
    }

    /// Port number
    pub fn number(&self) -> u16 {
        match self {
            Port::Udp2049 | Port::WgUdp2049 => 2049,
            Port::Udp2050 | Port::WgUdp2050 => 2050,
            Port::Udp53 | Port::WgUdp53 => 53,
            Port::Udp1194 | Port::WgUdp1194 => 1194,
            Port::Tcp443 => 443,
            Port::Tcp1443 => 1443,
            Port::Tcp80 => 80,
            Port::WgUdp30587 => 30587,
            Port::WgUdp41893 => 41893,
            Port::WgUdp48574 => 48574,
            Port::WgUdp58237 => 58237,
        }
    }

    /// Protocol this port belongs to
    pub fn protocol(&self) -> Protocol {
        match self {
            Port::Udp2049
            | Port::Udp2050
            | Port::Udp53
            | Port::Udp1194
            | Port::Tcp443
            | Port::Tcp1443
            | Port::Tcp80 => Protocol::OpenVpn,
            _ => Protocol::WireGuard,
        }
    }

    /// Position within this port's protocol list
    pub fn ordinal_for_protocol(&self) -> usize {
        Self::values_for(self.protocol())
            .iter()
            .position(|p| p == self)
            .unwrap_or(0)
    }

    /// Next candidate for the same protocol, wrapping at the end
    pub fn next(&self) -> Port {
        let ports = Self::values_for(self.protocol());
        ports[(self.ordinal_for_protocol() + 1) % ports.len()]
    }

    pub fn is_udp(&self) -> bool {
        self.transport() == Transport::Udp
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.transport(), self.number())
    }
}
