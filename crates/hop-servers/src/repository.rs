//! Servers Repository
//!
//! Session selection engine and catalog fetcher. Resolves the current
//! entry/exit server for the active protocol, keeps the pair valid for
//! multi-hop, refreshes the catalog and fans changes out to listeners.
//!
//! # Resolution Order
//!
//! `current_server(type)` answers from, in order:
//! 1. the in-memory selection table
//! 2. the persisted selection in the store
//! 3. the first catalog server compatible with the other leg
//!
//! Each fallback result is written back, so the next call is a table hit.
//!
//! # Locking
//!
//! The selection table sits behind a `std::sync::Mutex` held only for
//! single reads and writes. It is never held across store calls or while
//! listeners run, so listeners may call back into the repository.
//! Catalog fetches are serialized by a separate async gate.
//!
//! Background refreshes hold only a weak reference to the repository and
//! are aborted when the last handle is dropped, so a disposed repository
//! never writes a late result into the store.

use crate::api::{HttpServerListApi, ServerListApi, ServerListError};
use crate::config::HopConfig;
use crate::listeners::{
    ChangeBus, FavouriteServersListener, ServerChangedListener, ServerListUpdatedListener,
};
use crate::model::{CatalogConfig, Protocol, Server, ServerType, ServersListResponse};
use crate::settings::Settings;
use crate::snapshot::{EmbeddedSnapshot, FileSnapshot, SnapshotLoader};
use crate::store::{PreferenceStore, ServersStore, StoreError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};

/// Default deadline for one catalog fetch
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Protocol x ServerType selection table
#[derive(Debug, Default)]
struct SelectionTable {
    slots: [[Option<Server>; 2]; 2],
}

impl SelectionTable {
    fn get(&self, protocol: Protocol, server_type: ServerType) -> Option<Server> {
        self.slots[protocol.index()][server_type.index()].clone()
    }

    fn set(&mut self, protocol: Protocol, server_type: ServerType, server: Option<Server>) {
        self.slots[protocol.index()][server_type.index()] = server;
    }
}

struct Inner {
    settings: Arc<Settings>,
    store: Arc<dyn ServersStore>,
    api: Arc<dyn ServerListApi>,
    snapshot: Arc<dyn SnapshotLoader>,
    bus: ChangeBus,
    current: Mutex<SelectionTable>,
    fetch_gate: Arc<tokio::sync::Mutex<()>>,
    fetch_timeout: Duration,
    /// Background refreshes still running
    refreshes: Mutex<Vec<AbortHandle>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let refreshes = self.refreshes.get_mut().unwrap_or_else(PoisonError::into_inner);
        for refresh in refreshes.drain(..) {
            if !refresh.is_finished() {
                debug!("Repository dropped, cancelling server list refresh");
                refresh.abort();
            }
        }
    }
}

/// Handle to the server repository
///
/// Cloning is cheap; all clones share the same state.
#[derive(Clone)]
pub struct ServersRepository {
    inner: Arc<Inner>,
}

impl ServersRepository {
    pub fn new(
        settings: Arc<Settings>,
        store: Arc<dyn ServersStore>,
        api: Arc<dyn ServerListApi>,
        snapshot: Arc<dyn SnapshotLoader>,
    ) -> Self {
        Self::with_fetch_timeout(settings, store, api, snapshot, DEFAULT_FETCH_TIMEOUT)
    }

    pub fn with_fetch_timeout(
        settings: Arc<Settings>,
        store: Arc<dyn ServersStore>,
        api: Arc<dyn ServerListApi>,
        snapshot: Arc<dyn SnapshotLoader>,
        fetch_timeout: Duration,
    ) -> Self {
        settings.enable_fastest_server(store.is_fastest_server_enabled());

        Self {
            inner: Arc::new(Inner {
                settings,
                store,
                api,
                snapshot,
                bus: ChangeBus::new(),
                current: Mutex::new(SelectionTable::default()),
                fetch_gate: Arc::new(tokio::sync::Mutex::new(())),
                fetch_timeout,
                refreshes: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Build the file store, HTTP API and snapshot described by `config`
    pub fn from_config(config: &HopConfig) -> Result<Self, StoreError> {
        let settings = Arc::new(Settings::new(config.protocol, config.multi_hop));
        let store = Arc::new(PreferenceStore::open(&config.store_path)?);
        let api = Arc::new(HttpServerListApi::new(&config.api_url, config.fetch_timeout()));
        let snapshot: Arc<dyn SnapshotLoader> = match config.snapshot_path {
            Some(ref path) => Arc::new(FileSnapshot::new(path)),
            None => Arc::new(EmbeddedSnapshot),
        };

        Ok(Self::with_fetch_timeout(
            settings,
            store,
            api,
            snapshot,
            config.fetch_timeout(),
        ))
    }

    pub fn settings(&self) -> &Arc<Settings> {
        &self.inner.settings
    }

    fn protocol(&self) -> Protocol {
        self.inner.settings.protocol()
    }

    fn table(&self) -> MutexGuard<'_, SelectionTable> {
        self.inner.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn log_store_error(what: &str, result: Result<(), StoreError>) {
        if let Err(e) = result {
            warn!("Failed to persist {}: {}", what, e);
        }
    }

    /// Write one leg to the table and the store, without validation
    fn put_selection(&self, protocol: Protocol, server_type: ServerType, server: Option<&Server>) {
        self.table().set(protocol, server_type, server.cloned());
        Self::log_store_error(
            "current server",
            self.inner.store.set_current_server(protocol, server_type, server),
        );
    }

    // ---- Selection -------------------------------------------------------

    /// Current server for `server_type` under the active protocol
    pub fn current_server(&self, server_type: ServerType) -> Option<Server> {
        let protocol = self.protocol();

        if let Some(server) = self.table().get(protocol, server_type) {
            return Some(server);
        }

        if let Some(server) = self.inner.store.current_server(protocol, server_type) {
            debug!("Restored {} server {} from store", server_type, server.gateway);
            self.set_current_server(server_type, Some(&server));
            return Some(server);
        }

        let server = self.default_server(server_type);
        self.set_current_server(server_type, server.as_ref());
        server
    }

    /// Resolve a leg without repairing its partner
    fn resolve_without_repair(&self, protocol: Protocol, server_type: ServerType) -> Option<Server> {
        if let Some(server) = self.table().get(protocol, server_type) {
            return Some(server);
        }

        let server = self
            .inner
            .store
            .current_server(protocol, server_type)
            .or_else(|| self.default_server(server_type));

        if let Some(ref server) = server {
            self.put_selection(protocol, server_type, Some(server));
        }
        server
    }

    /// Select `server` for `server_type`.
    ///
    /// `None` is ignored. If the other leg cannot be chained with the new
    /// server it is replaced by a fresh default. The repair goes exactly
    /// one level deep: the replacement is not checked again.
    pub fn set_current_server(&self, server_type: ServerType, server: Option<&Server>) {
        let Some(server) = server else {
            return;
        };
        let protocol = self.protocol();
        info!("Set current server = {} serverType = {}", server, server_type);

        self.put_selection(protocol, server_type, Some(server));

        let another_type = server_type.another();
        let another = self.resolve_without_repair(protocol, another_type);
        if !server.can_be_used_as_multi_hop_with(another.as_ref()) {
            let replacement = self.default_server(another_type);
            info!(
                "{} server {:?} conflicts with {}, replaced by {:?}",
                another_type,
                another.map(|s| s.gateway),
                server.gateway,
                replacement.as_ref().map(|s| &s.gateway)
            );
            self.put_selection(protocol, another_type, replacement.as_ref());
        }
    }

    /// First catalog server that can be chained with the persisted
    /// server of the other leg. `None` if the catalog is empty or no
    /// server qualifies.
    pub fn default_server(&self, server_type: ServerType) -> Option<Server> {
        let servers = self.servers(false)?;
        let another = self
            .inner
            .store
            .current_server(self.protocol(), server_type.another());

        servers
            .into_iter()
            .find(|server| server.can_be_used_as_multi_hop_with(another.as_ref()))
    }

    /// The other leg's server, which must not be offered for
    /// `server_type` while multi-hop is on
    pub fn forbidden_server(&self, server_type: ServerType) -> Option<Server> {
        if !self.inner.settings.is_multi_hop_enabled() {
            return None;
        }
        self.inner
            .store
            .current_server(self.protocol(), server_type.another())
    }

    fn set_fastest_server(&self, enabled: bool) {
        self.inner.settings.enable_fastest_server(enabled);
        Self::log_store_error(
            "fastest-server mode",
            self.inner.store.set_fastest_server_enabled(enabled),
        );
    }

    /// User picked a specific server
    pub fn server_selected(&self, server: &Server, server_type: ServerType) {
        self.set_fastest_server(false);
        self.set_current_server(server_type, Some(server));

        if server_type == ServerType::Entry {
            debug!("Entry server changed, session needs reconfiguration");
        }
        self.inner.bus.server_changed();
    }

    /// User picked fastest-server mode; stored selections are untouched
    pub fn fastest_server_selected(&self) {
        self.set_fastest_server(true);
        self.inner.bus.server_changed();
    }

    // ---- Catalog ---------------------------------------------------------

    /// Cached list for the active protocol.
    ///
    /// When forced, or when nothing is cached, an online refresh is
    /// started on the ambient tokio runtime (if any) and the bundled
    /// snapshot fills an empty cache immediately.
    pub fn servers(&self, is_forced: bool) -> Option<Vec<Server>> {
        let protocol = self.protocol();
        let mut servers = self.inner.store.servers_list(protocol);

        if is_forced || servers.is_none() {
            self.spawn_update(is_forced);
            self.try_update_server_list_offline();
            servers = self.inner.store.servers_list(protocol);
        }
        servers
    }

    fn spawn_update(&self, is_forced: bool) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                debug!("No async runtime, skipping online server list refresh");
                return;
            }
        };

        let weak = Arc::downgrade(&self.inner);
        let gate = self.inner.fetch_gate.clone();
        let api = self.inner.api.clone();
        let timeout = self.inner.fetch_timeout;

        let task = handle.spawn(async move {
            let Some(guard) = Self::acquire_gate(&gate, is_forced).await else {
                return;
            };
            let result = Self::fetch(api.as_ref(), timeout).await;
            match Weak::upgrade(&weak) {
                Some(inner) => Self { inner }.apply_fetch_result(result, guard, is_forced),
                None => debug!("Repository dropped, discarding server list refresh"),
            }
        });

        let mut refreshes = self
            .inner
            .refreshes
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        refreshes.retain(|refresh| !refresh.is_finished());
        refreshes.push(task.abort_handle());
    }

    pub fn is_servers_list_exist(&self) -> bool {
        self.inner
            .store
            .servers_list(self.protocol())
            .is_some_and(|servers| !servers.is_empty())
    }

    /// Replace both cached lists
    pub fn set_server_list(&self, openvpn: &[Server], wireguard: &[Server]) {
        info!(
            "Putting servers, OpenVPN servers list size = {} WireGuard = {}",
            openvpn.len(),
            wireguard.len()
        );
        Self::log_store_error(
            "server lists",
            self.inner.store.put_server_lists(openvpn, wireguard),
        );
    }

    fn apply_catalog_config(&self, config: &CatalogConfig) {
        let store = &self.inner.store;
        Self::log_store_error("anti-tracker DNS", store.set_anti_tracker_dns(&config.anti_tracker_dns()));
        Self::log_store_error("IP list", store.set_ip_list(&config.ip_list()));
    }

    /// Fetch the live catalog.
    ///
    /// Success replaces both lists and the configuration values, then
    /// notifies list listeners with the active protocol's servers. Any
    /// failure leaves the store untouched and is reported to listeners
    /// only. A lazy refresh is skipped while another fetch is running; a
    /// forced one waits for it and then fetches again.
    pub async fn update_server_list(&self, is_forced: bool) {
        let Some(gate) = Self::acquire_gate(&self.inner.fetch_gate, is_forced).await else {
            return;
        };
        let result = Self::fetch(self.inner.api.as_ref(), self.inner.fetch_timeout).await;
        self.apply_fetch_result(result, gate, is_forced);
    }

    /// Forced callers wait for the gate; lazy ones give up if it is held
    async fn acquire_gate(
        gate: &tokio::sync::Mutex<()>,
        is_forced: bool,
    ) -> Option<tokio::sync::MutexGuard<'_, ()>> {
        if is_forced {
            return Some(gate.lock().await);
        }
        match gate.try_lock() {
            Ok(guard) => Some(guard),
            Err(_) => {
                debug!("Server list fetch already in flight, skipping lazy refresh");
                None
            }
        }
    }

    async fn fetch(
        api: &dyn ServerListApi,
        timeout: Duration,
    ) -> Result<ServersListResponse, ServerListError> {
        info!("Updating server list");
        match tokio::time::timeout(timeout, api.list_servers()).await {
            Ok(result) => result,
            Err(_) => Err(ServerListError::Timeout(timeout)),
        }
    }

    /// Store a fetch outcome, release `gate`, then notify listeners
    fn apply_fetch_result<G>(
        &self,
        result: Result<ServersListResponse, ServerListError>,
        gate: G,
        is_forced: bool,
    ) {
        match result {
            Ok(mut response) => {
                info!("Updating server list, state = SUCCESS");
                response.mark_server_types();
                self.set_server_list(&response.openvpn, &response.wireguard);
                self.apply_catalog_config(&response.config);
                drop(gate);

                let suitable = response.servers_for(self.protocol());
                self.inner.bus.server_list_updated(suitable, is_forced);
            }
            Err(e) => {
                drop(gate);
                error!("Updating server list, state = ERROR: {}", e);
                self.inner.bus.server_list_failed(&e);
            }
        }
    }

    /// Fill an empty cache from the bundled snapshot. No-op when a list
    /// is already cached.
    pub fn try_update_server_list_offline(&self) {
        debug!("Trying to update server list offline from cache");
        if self.inner.store.servers_list(self.protocol()).is_some() {
            return;
        }

        let mut response = match self.inner.snapshot.load() {
            Ok(response) => response,
            Err(e) => {
                error!("Failed to load bundled server snapshot: {}", e);
                return;
            }
        };
        response.mark_server_types();
        self.apply_catalog_config(&response.config);
        self.set_server_list(&response.openvpn, &response.wireguard);
    }

    /// Fill a missing IP allowlist (and DNS values) from the bundled
    /// snapshot, whether or not a server list is cached.
    pub fn try_update_ip_list(&self) {
        if self.inner.store.ip_list().is_some() {
            return;
        }

        match self.inner.snapshot.load() {
            Ok(response) => self.apply_catalog_config(&response.config),
            Err(e) => error!("Failed to load bundled server snapshot: {}", e),
        }
    }

    // ---- Favourites and exclusions ---------------------------------------

    pub fn favourite_servers(&self) -> Vec<Server> {
        self.inner.store.favourite_servers(self.protocol())
    }

    pub fn add_favourite_server(&self, server: &Server) {
        info!("addFavouritesServer server = {}", server);
        Self::log_store_error(
            "favourite",
            self.inner.store.add_favourite_server(self.protocol(), server),
        );
        self.inner.bus.favourite_added(server);
    }

    pub fn remove_favourite_server(&self, server: &Server) {
        info!("removeFavouritesServer server = {}", server);
        Self::log_store_error(
            "favourite",
            self.inner.store.remove_favourite_server(self.protocol(), server),
        );
        self.inner.bus.favourite_removed(server);
    }

    pub fn excluded_servers(&self) -> Vec<Server> {
        self.inner.store.excluded_servers(self.protocol())
    }

    pub fn add_to_excluded_servers(&self, server: &Server) {
        info!("Add to excluded servers list: {}", server);
        Self::log_store_error(
            "excluded server",
            self.inner.store.add_excluded_server(self.protocol(), server),
        );
    }

    pub fn remove_from_excluded_servers(&self, server: &Server) {
        info!("Remove from excluded servers list: {}", server);
        Self::log_store_error(
            "excluded server",
            self.inner.store.remove_excluded_server(self.protocol(), server),
        );
    }

    /// Cached servers minus exclusions. Never empty while a default ENTRY
    /// server exists: if everything is excluded, that default is returned.
    pub fn possible_servers(&self) -> Vec<Server> {
        let protocol = self.protocol();
        let excluded = self.excluded_servers();

        let servers = match self.inner.store.servers_list(protocol) {
            Some(servers) => servers,
            None => {
                self.try_update_server_list_offline();
                self.inner.store.servers_list(protocol).unwrap_or_default()
            }
        };

        let mut possible: Vec<Server> = servers
            .into_iter()
            .filter(|server| !excluded.contains(server))
            .collect();

        if possible.is_empty() {
            possible.extend(self.default_server(ServerType::Entry));
        }
        possible
    }

    // ---- Listeners -------------------------------------------------------

    pub fn add_favourite_listener(&self, listener: Arc<dyn FavouriteServersListener>) {
        self.inner.bus.favourites.add(listener);
    }

    pub fn remove_favourite_listener(&self, listener: &Arc<dyn FavouriteServersListener>) {
        self.inner.bus.favourites.remove(listener);
    }

    pub fn add_server_list_listener(&self, listener: Arc<dyn ServerListUpdatedListener>) {
        self.inner.bus.server_list.add(listener);
    }

    pub fn remove_server_list_listener(&self, listener: &Arc<dyn ServerListUpdatedListener>) {
        self.inner.bus.server_list.remove(listener);
    }

    pub fn add_server_changed_listener(&self, listener: Arc<dyn ServerChangedListener>) {
        self.inner.bus.server_changed.add(listener);
    }

    pub fn remove_server_changed_listener(&self, listener: &Arc<dyn ServerChangedListener>) {
        self.inner.bus.server_changed.remove(listener);
    }
}
