#![allow(dead_code)]

use hop_servers::{
    AntiTrackerDns, AntiTrackerTier, ApiInfo, CatalogConfig, FavouriteServersListener,
    PreferenceStore, Protocol, Server, ServerChangedListener, ServerListApi, ServerListError,
    ServerListUpdatedListener, ServersListResponse, ServersRepository, ServersStore, Settings,
    SnapshotError, SnapshotLoader, async_trait,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn server(gateway: &str, country_code: &str) -> Server {
    Server::new(gateway, country_code, country_code, "City")
}

pub fn catalog_config(dns_prefix: &str) -> CatalogConfig {
    let mut config = CatalogConfig::default();
    config.antitracker.default = AntiTrackerTier {
        ip: format!("{dns_prefix}.2"),
        multihop_ip: format!("{dns_prefix}.102"),
    };
    config.antitracker.hardcore = AntiTrackerTier {
        ip: format!("{dns_prefix}.3"),
        multihop_ip: format!("{dns_prefix}.103"),
    };
    config.api = ApiInfo {
        ips: vec!["192.0.2.1".to_string(), "192.0.2.2".to_string()],
    };
    config
}

pub fn response(openvpn: Vec<Server>, wireguard: Vec<Server>) -> ServersListResponse {
    ServersListResponse {
        openvpn,
        wireguard,
        config: catalog_config("10.0.254"),
    }
}

/// Snapshot returning a fixed response
pub struct StaticSnapshot(pub ServersListResponse);

impl SnapshotLoader for StaticSnapshot {
    fn load(&self) -> Result<ServersListResponse, SnapshotError> {
        Ok(self.0.clone())
    }
}

/// API answering from a queue of scripted results
pub struct ScriptedApi {
    results: Mutex<VecDeque<Result<ServersListResponse, ServerListError>>>,
    calls: AtomicUsize,
    delay: Duration,
}

impl ScriptedApi {
    pub fn new(results: Vec<Result<ServersListResponse, ServerListError>>) -> Self {
        Self::with_delay(results, Duration::ZERO)
    }

    pub fn with_delay(
        results: Vec<Result<ServersListResponse, ServerListError>>,
        delay: Duration,
    ) -> Self {
        Self {
            results: Mutex::new(results.into()),
            calls: AtomicUsize::new(0),
            delay,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServerListApi for ScriptedApi {
    async fn list_servers(&self) -> Result<ServersListResponse, ServerListError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.results.lock().unwrap().pop_front();
        next.unwrap_or_else(|| {
            Err(ServerListError::Api {
                status: 500,
                message: "no scripted response".to_string(),
            })
        })
    }
}

pub struct Fixture {
    pub settings: Arc<Settings>,
    pub store: Arc<PreferenceStore>,
    pub api: Arc<ScriptedApi>,
    pub repository: ServersRepository,
}

impl Fixture {
    pub fn new(api: ScriptedApi, snapshot: ServersListResponse) -> Self {
        Self::with_timeout(api, snapshot, Duration::from_secs(5))
    }

    pub fn with_timeout(api: ScriptedApi, snapshot: ServersListResponse, timeout: Duration) -> Self {
        let settings = Arc::new(Settings::new(Protocol::WireGuard, false));
        let store = Arc::new(PreferenceStore::in_memory());
        let api = Arc::new(api);
        let repository = ServersRepository::with_fetch_timeout(
            settings.clone(),
            store.clone(),
            api.clone(),
            Arc::new(StaticSnapshot(snapshot)),
            timeout,
        );
        Self {
            settings,
            store,
            api,
            repository,
        }
    }

    /// Repository whose store already holds `wireguard` (and no OpenVPN servers)
    pub fn with_wireguard(wireguard: Vec<Server>) -> Self {
        let fixture = Self::new(ScriptedApi::new(vec![]), ServersListResponse::default());
        fixture.store.put_server_lists(&[], &wireguard).unwrap();
        fixture
    }
}

#[derive(Default)]
pub struct ChangeCounter {
    pub count: AtomicUsize,
}

impl ServerChangedListener for ChangeCounter {
    fn on_server_changed(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FavouritesRecorder {
    pub events: Mutex<Vec<(String, String)>>,
}

impl FavouriteServersListener for FavouritesRecorder {
    fn added(&self, server: &Server) {
        self.events
            .lock()
            .unwrap()
            .push(("added".to_string(), server.gateway.clone()));
    }

    fn removed(&self, server: &Server) {
        self.events
            .lock()
            .unwrap()
            .push(("removed".to_string(), server.gateway.clone()));
    }
}

/// Records list notifications together with the DNS values visible in
/// the store at callback time
pub struct ListRecorder {
    pub store: Arc<PreferenceStore>,
    pub successes: Mutex<Vec<(Vec<String>, bool, Option<AntiTrackerDns>)>>,
    pub errors: Mutex<Vec<String>>,
}

impl ListRecorder {
    pub fn new(store: Arc<PreferenceStore>) -> Self {
        Self {
            store,
            successes: Mutex::new(Vec::new()),
            errors: Mutex::new(Vec::new()),
        }
    }
}

impl ServerListUpdatedListener for ListRecorder {
    fn on_success(&self, servers: &[Server], is_forced: bool) {
        let gateways = servers.iter().map(|s| s.gateway.clone()).collect();
        self.successes
            .lock()
            .unwrap()
            .push((gateways, is_forced, self.store.anti_tracker_dns()));
    }

    fn on_error(&self, error: &ServerListError) {
        self.errors.lock().unwrap().push(error.to_string());
    }
}
