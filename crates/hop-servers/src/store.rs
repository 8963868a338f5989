//! Server Catalog Store
//!
//! Durable key-value storage for everything the session layer must
//! remember across restarts:
//!
//! - last-known server list per protocol
//! - current entry/exit selection per protocol
//! - favourites and excluded servers per protocol
//! - anti-tracking DNS endpoints and the API IP allowlist
//! - fastest-server mode
//!
//! [`PreferenceStore`] keeps the whole state in memory and, when opened
//! on a file, rewrites that file as JSON after each mutation using a
//! temp-file-then-rename pattern so readers never see a partial write.

use crate::model::{AntiTrackerDns, Protocol, Server, ServerType};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Persistence boundary used by the session layer
///
/// Reads never fail: absence is `None` or an empty list. Writes report
/// I/O failures so the caller can log them.
pub trait ServersStore: Send + Sync {
    /// Persisted selection for one leg
    fn current_server(&self, protocol: Protocol, server_type: ServerType) -> Option<Server>;

    /// Persist (or clear) the selection for one leg
    fn set_current_server(
        &self,
        protocol: Protocol,
        server_type: ServerType,
        server: Option<&Server>,
    ) -> Result<(), StoreError>;

    /// Cached server list, `None` if nothing was ever stored
    fn servers_list(&self, protocol: Protocol) -> Option<Vec<Server>>;

    /// Replace both cached lists
    fn put_server_lists(&self, openvpn: &[Server], wireguard: &[Server]) -> Result<(), StoreError>;

    fn favourite_servers(&self, protocol: Protocol) -> Vec<Server>;

    fn add_favourite_server(&self, protocol: Protocol, server: &Server) -> Result<(), StoreError>;

    fn remove_favourite_server(&self, protocol: Protocol, server: &Server) -> Result<(), StoreError>;

    fn excluded_servers(&self, protocol: Protocol) -> Vec<Server>;

    fn add_excluded_server(&self, protocol: Protocol, server: &Server) -> Result<(), StoreError>;

    fn remove_excluded_server(&self, protocol: Protocol, server: &Server) -> Result<(), StoreError>;

    fn anti_tracker_dns(&self) -> Option<AntiTrackerDns>;

    fn set_anti_tracker_dns(&self, dns: &AntiTrackerDns) -> Result<(), StoreError>;

    /// Comma-joined API IP allowlist
    fn ip_list(&self) -> Option<String>;

    fn set_ip_list(&self, ips: &str) -> Result<(), StoreError>;

    fn is_fastest_server_enabled(&self) -> bool;

    fn set_fastest_server_enabled(&self, enabled: bool) -> Result<(), StoreError>;
}

/// One value per protocol
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerProtocol<T> {
    pub openvpn: T,
    pub wireguard: T,
}

impl<T> PerProtocol<T> {
    pub fn get(&self, protocol: Protocol) -> &T {
        match protocol {
            Protocol::OpenVpn => &self.openvpn,
            Protocol::WireGuard => &self.wireguard,
        }
    }

    pub fn get_mut(&mut self, protocol: Protocol) -> &mut T {
        match protocol {
            Protocol::OpenVpn => &mut self.openvpn,
            Protocol::WireGuard => &mut self.wireguard,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Selection {
    entry: Option<Server>,
    exit: Option<Server>,
}

impl Selection {
    fn get(&self, server_type: ServerType) -> &Option<Server> {
        match server_type {
            ServerType::Entry => &self.entry,
            ServerType::Exit => &self.exit,
        }
    }

    fn slot(&mut self, server_type: ServerType) -> &mut Option<Server> {
        match server_type {
            ServerType::Entry => &mut self.entry,
            ServerType::Exit => &mut self.exit,
        }
    }
}

/// Everything the store persists
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct StoreState {
    #[serde(default)]
    current: PerProtocol<Selection>,
    #[serde(default)]
    servers: PerProtocol<Option<Vec<Server>>>,
    #[serde(default)]
    favourites: PerProtocol<Vec<Server>>,
    #[serde(default)]
    excluded: PerProtocol<Vec<Server>>,
    #[serde(default)]
    anti_tracker: Option<AntiTrackerDns>,
    #[serde(default)]
    ip_list: Option<String>,
    #[serde(default)]
    fastest_server: bool,
}

/// JSON-backed preference store
pub struct PreferenceStore {
    state: Mutex<StoreState>,
    /// Backing file; `None` keeps everything in memory
    path: Option<PathBuf>,
    /// Number of committed mutations
    writes: AtomicU64,
}

impl PreferenceStore {
    /// Create a store that never touches disk
    pub fn in_memory() -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            path: None,
            writes: AtomicU64::new(0),
        }
    }

    /// Open a store backed by `path`, loading existing content if present
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let state = if path.exists() {
            let content = fs::read_to_string(path)?;
            let state: StoreState = serde_json::from_str(&content)?;
            info!("Loaded server store from {}", path.display());
            state
        } else {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            debug!("No server store at {}, starting empty", path.display());
            StoreState::default()
        };

        Ok(Self {
            state: Mutex::new(state),
            path: Some(path.to_path_buf()),
            writes: AtomicU64::new(0),
        })
    }

    /// Number of mutations committed since creation
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply a mutation and persist the result.
    ///
    /// The mutation is made on a copy; memory only changes once the file
    /// has been replaced, so a failed write leaves both sides as they were.
    fn update<F>(&self, mutate: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut StoreState),
    {
        let mut state = self.lock();
        let mut next = state.clone();
        mutate(&mut next);

        if let Some(ref path) = self.path {
            Self::persist(path, &next)?;
        }
        *state = next;
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn persist(path: &Path, state: &StoreState) -> Result<(), StoreError> {
        let serialized = serde_json::to_vec_pretty(state)?;
        let temp_path = path.with_extension("tmp");

        let mut file = fs::File::create(&temp_path)?;
        file.write_all(&serialized)?;
        file.sync_all()?;
        drop(file);

        if let Err(e) = fs::rename(&temp_path, path) {
            warn!("Failed to replace {}: {}", path.display(), e);
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }
        Ok(())
    }
}

impl ServersStore for PreferenceStore {
    fn current_server(&self, protocol: Protocol, server_type: ServerType) -> Option<Server> {
        self.lock().current.get(protocol).get(server_type).clone()
    }

    fn set_current_server(
        &self,
        protocol: Protocol,
        server_type: ServerType,
        server: Option<&Server>,
    ) -> Result<(), StoreError> {
        self.update(|state| {
            *state.current.get_mut(protocol).slot(server_type) = server.cloned();
        })
    }

    fn servers_list(&self, protocol: Protocol) -> Option<Vec<Server>> {
        self.lock().servers.get(protocol).clone()
    }

    fn put_server_lists(&self, openvpn: &[Server], wireguard: &[Server]) -> Result<(), StoreError> {
        self.update(|state| {
            state.servers.openvpn = Some(openvpn.to_vec());
            state.servers.wireguard = Some(wireguard.to_vec());
        })
    }

    fn favourite_servers(&self, protocol: Protocol) -> Vec<Server> {
        self.lock().favourites.get(protocol).clone()
    }

    fn add_favourite_server(&self, protocol: Protocol, server: &Server) -> Result<(), StoreError> {
        self.update(|state| add_unique(state.favourites.get_mut(protocol), server))
    }

    fn remove_favourite_server(&self, protocol: Protocol, server: &Server) -> Result<(), StoreError> {
        self.update(|state| state.favourites.get_mut(protocol).retain(|s| s != server))
    }

    fn excluded_servers(&self, protocol: Protocol) -> Vec<Server> {
        self.lock().excluded.get(protocol).clone()
    }

    fn add_excluded_server(&self, protocol: Protocol, server: &Server) -> Result<(), StoreError> {
        self.update(|state| add_unique(state.excluded.get_mut(protocol), server))
    }

    fn remove_excluded_server(&self, protocol: Protocol, server: &Server) -> Result<(), StoreError> {
        self.update(|state| state.excluded.get_mut(protocol).retain(|s| s != server))
    }

    fn anti_tracker_dns(&self) -> Option<AntiTrackerDns> {
        self.lock().anti_tracker.clone()
    }

    fn set_anti_tracker_dns(&self, dns: &AntiTrackerDns) -> Result<(), StoreError> {
        self.update(|state| state.anti_tracker = Some(dns.clone()))
    }

    fn ip_list(&self) -> Option<String> {
        self.lock().ip_list.clone()
    }

    fn set_ip_list(&self, ips: &str) -> Result<(), StoreError> {
        self.update(|state| state.ip_list = Some(ips.to_string()))
    }

    fn is_fastest_server_enabled(&self) -> bool {
        self.lock().fastest_server
    }

    fn set_fastest_server_enabled(&self, enabled: bool) -> Result<(), StoreError> {
        self.update(|state| state.fastest_server = enabled)
    }
}

fn add_unique(list: &mut Vec<Server>, server: &Server) {
    if !list.contains(server) {
        list.push(server.clone());
    }
}
