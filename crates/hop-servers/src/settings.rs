//! Session settings that steer server selection.

use crate::model::Protocol;
use std::sync::{PoisonError, RwLock};
use tracing::debug;

#[derive(Debug, Clone, Copy)]
struct SettingsState {
    protocol: Protocol,
    multi_hop: bool,
    fastest_server: bool,
}

/// Active protocol, multi-hop and fastest-server mode
#[derive(Debug)]
pub struct Settings {
    state: RwLock<SettingsState>,
}

impl Settings {
    pub fn new(protocol: Protocol, multi_hop: bool) -> Self {
        Self {
            state: RwLock::new(SettingsState {
                protocol,
                multi_hop,
                fastest_server: false,
            }),
        }
    }

    fn read(&self) -> SettingsState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write<F: FnOnce(&mut SettingsState)>(&self, f: F) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut state);
    }

    /// Protocol whose selections are currently in use
    pub fn protocol(&self) -> Protocol {
        self.read().protocol
    }

    pub fn set_protocol(&self, protocol: Protocol) {
        debug!("Active protocol: {}", protocol);
        self.write(|s| s.protocol = protocol);
    }

    pub fn is_multi_hop_enabled(&self) -> bool {
        self.read().multi_hop
    }

    pub fn set_multi_hop_enabled(&self, enabled: bool) {
        self.write(|s| s.multi_hop = enabled);
    }

    pub fn is_fastest_server_enabled(&self) -> bool {
        self.read().fastest_server
    }

    pub fn enable_fastest_server(&self, enabled: bool) {
        self.write(|s| s.fastest_server = enabled);
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new(Protocol::WireGuard, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.protocol(), Protocol::WireGuard);
        assert!(!settings.is_multi_hop_enabled());
        assert!(!settings.is_fastest_server_enabled());
    }

    #[test]
    fn test_toggles() {
        let settings = Settings::new(Protocol::OpenVpn, true);
        settings.enable_fastest_server(true);
        settings.set_protocol(Protocol::WireGuard);

        assert!(settings.is_fastest_server_enabled());
        assert!(settings.is_multi_hop_enabled());
        assert_eq!(settings.protocol(), Protocol::WireGuard);
    }
}
