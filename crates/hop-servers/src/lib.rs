//! Hop Servers - Server Catalog and Session Selection
//!
//! Tracks which entry/exit server is active per protocol, keeps the pair
//! valid for multi-hop, persists and refreshes the server catalog, and
//! notifies UI listeners about changes.
//!
//! # Architecture
//!
//! ```text
//!        UI / tunnel collaborators
//!                 │  ▲
//!       queries   │  │  notifications (ChangeBus)
//!                 ▼  │
//!        ┌─────────────────────┐
//!        │  ServersRepository  │  selection engine + fetcher
//!        └──┬───────┬───────┬──┘
//!           │       │       │
//!           ▼       ▼       ▼
//!     ServersStore  │   SnapshotLoader
//!     (JSON file)   │   (bundled catalog)
//!                   ▼
//!             ServerListApi
//!             (HTTPS, timeout)
//! ```
//!
//! # Guarantees
//!
//! - Lookups never fail hard: absence is `None`
//! - Fetch failures leave the cached catalog untouched
//! - Multi-hop conflicts are repaired by substituting a default server

mod api;
mod config;
mod listeners;
mod model;
mod port;
mod repository;
mod retry;
mod settings;
mod snapshot;
mod store;

pub use api::{DEFAULT_API_URL, HttpServerListApi, ServerListApi, ServerListError};
pub use config::{ConfigError, HopConfig};
pub use listeners::{
    ChangeBus, FavouriteServersListener, ListenerRegistry, ServerChangedListener,
    ServerListUpdatedListener,
};
pub use model::{
    AntiTracker, AntiTrackerDns, AntiTrackerTier, ApiInfo, CatalogConfig, Host, Protocol, Server,
    ServerType, ServersListResponse,
};
pub use port::{Port, Transport};
pub use repository::{DEFAULT_FETCH_TIMEOUT, ServersRepository};
pub use retry::{
    ConnectionRetry, ConnectionTarget, RetryError, TunnelEngine, TunnelError, connect_with_retry,
};
pub use settings::Settings;
pub use snapshot::{EmbeddedSnapshot, FileSnapshot, SnapshotError, SnapshotLoader};
pub use store::{PerProtocol, PreferenceStore, ServersStore, StoreError};

// Re-exported so implementors of `ServerListApi` and `TunnelEngine` need
// no direct dependency.
pub use async_trait::async_trait;
