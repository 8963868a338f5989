//! Server Catalog Model
//!
//! Value types for the server catalog: servers, their protocol family,
//! the entry/exit role they play in a session, and the list response
//! returned by the catalog feed (network or bundled snapshot).
//!
//! # Feed Shape
//!
//! ```text
//! {
//!   "wireguard": [ Server, ... ],
//!   "openvpn":   [ Server, ... ],
//!   "config": {
//!     "antitracker": {
//!       "default":  { "ip": "...", "multihop-ip": "..." },
//!       "hardcore": { "ip": "...", "multihop-ip": "..." }
//!     },
//!     "api": { "ips": [ "...", ... ] }
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// VPN protocol family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    OpenVpn,
    WireGuard,
}

impl Protocol {
    /// All protocols, in table order
    pub fn all() -> &'static [Protocol] {
        &[Protocol::OpenVpn, Protocol::WireGuard]
    }

    /// Index into fixed per-protocol tables
    pub(crate) fn index(self) -> usize {
        match self {
            Protocol::OpenVpn => 0,
            Protocol::WireGuard => 1,
        }
    }

    /// Display name
    pub fn name(&self) -> &'static str {
        match self {
            Protocol::OpenVpn => "OpenVPN",
            Protocol::WireGuard => "WireGuard",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openvpn" | "ovpn" => Ok(Protocol::OpenVpn),
            "wireguard" | "wg" => Ok(Protocol::WireGuard),
            _ => Err(format!("unknown protocol: {s}")),
        }
    }
}

/// Role of a server within a (possibly multi-hop) session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerType {
    Entry,
    Exit,
}

impl ServerType {
    /// All server types, in table order
    pub fn all() -> &'static [ServerType] {
        &[ServerType::Entry, ServerType::Exit]
    }

    /// The other leg of the session
    pub fn another(self) -> ServerType {
        match self {
            ServerType::Entry => ServerType::Exit,
            ServerType::Exit => ServerType::Entry,
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            ServerType::Entry => 0,
            ServerType::Exit => 1,
        }
    }
}

impl fmt::Display for ServerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerType::Entry => write!(f, "entry"),
            ServerType::Exit => write!(f, "exit"),
        }
    }
}

/// WireGuard host behind a gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Host {
    pub hostname: String,
    /// Public IP of the host
    pub host: String,
    /// Peer public key (base64)
    pub public_key: String,
    /// Tunnel-side address (CIDR)
    #[serde(default)]
    pub local_ip: String,
    #[serde(default)]
    pub multihop_port: Option<u16>,
}

/// A VPN endpoint from the catalog
///
/// Identity is the `gateway` name: two servers with the same gateway are
/// the same server even if their metadata differs between feeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub gateway: String,
    pub country_code: String,
    pub country: String,
    pub city: String,
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
    #[serde(default)]
    pub isp: Option<String>,
    /// OpenVPN entry addresses
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ip_addresses: Vec<String>,
    /// WireGuard hosts
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<Host>,
    /// Protocol family, assigned when the list is marked
    #[serde(default)]
    pub protocol: Option<Protocol>,
}

impl Server {
    /// Create a server with location metadata only
    pub fn new(gateway: &str, country_code: &str, country: &str, city: &str) -> Self {
        Self {
            gateway: gateway.to_string(),
            country_code: country_code.to_string(),
            country: country.to_string(),
            city: city.to_string(),
            latitude: 0.0,
            longitude: 0.0,
            isp: None,
            ip_addresses: Vec::new(),
            hosts: Vec::new(),
            protocol: None,
        }
    }

    /// Check whether this server may be chained with `other` in a
    /// multi-hop session. Servers in the same country cannot be paired.
    pub fn can_be_used_as_multi_hop_with(&self, other: Option<&Server>) -> bool {
        match other {
            None => true,
            Some(other) => !self.country_code.eq_ignore_ascii_case(&other.country_code),
        }
    }

    /// Short description, e.g. "Vienna, AT"
    pub fn description(&self) -> String {
        format!("{}, {}", self.city, self.country_code)
    }
}

impl PartialEq for Server {
    fn eq(&self, other: &Self) -> bool {
        self.gateway == other.gateway
    }
}

impl Eq for Server {}

impl Hash for Server {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.gateway.hash(state);
    }
}

impl fmt::Display for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.gateway, self.description())
    }
}

/// Anti-tracking resolver pair for one filtering tier
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AntiTrackerTier {
    pub ip: String,
    #[serde(rename = "multihop-ip", default)]
    pub multihop_ip: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AntiTracker {
    pub default: AntiTrackerTier,
    pub hardcore: AntiTrackerTier,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiInfo {
    #[serde(default)]
    pub ips: Vec<String>,
}

/// Configuration block of the list response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub antitracker: AntiTracker,
    #[serde(default)]
    pub api: ApiInfo,
}

/// Anti-tracking DNS endpoints as persisted in settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AntiTrackerDns {
    pub default_dns: String,
    pub hardcore_dns: String,
    pub default_dns_multi_hop: String,
    pub hardcore_dns_multi_hop: String,
}

impl CatalogConfig {
    /// The four anti-tracking resolver values
    pub fn anti_tracker_dns(&self) -> AntiTrackerDns {
        AntiTrackerDns {
            default_dns: self.antitracker.default.ip.clone(),
            hardcore_dns: self.antitracker.hardcore.ip.clone(),
            default_dns_multi_hop: self.antitracker.default.multihop_ip.clone(),
            hardcore_dns_multi_hop: self.antitracker.hardcore.multihop_ip.clone(),
        }
    }

    /// API addresses joined into the allowlist string
    pub fn ip_list(&self) -> String {
        self.api.ips.join(",")
    }
}

/// Parsed server-list response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServersListResponse {
    #[serde(default)]
    pub wireguard: Vec<Server>,
    #[serde(default)]
    pub openvpn: Vec<Server>,
    #[serde(default)]
    pub config: CatalogConfig,
}

impl ServersListResponse {
    /// Parse from JSON
    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    /// Tag every server with the protocol family of the list it came from
    pub fn mark_server_types(&mut self) {
        for server in &mut self.openvpn {
            server.protocol = Some(Protocol::OpenVpn);
        }
        for server in &mut self.wireguard {
            server.protocol = Some(Protocol::WireGuard);
        }
    }

    /// Servers for one protocol, in feed order
    pub fn servers_for(&self, protocol: Protocol) -> &[Server] {
        match protocol {
            Protocol::OpenVpn => &self.openvpn,
            Protocol::WireGuard => &self.wireguard,
        }
    }
}
