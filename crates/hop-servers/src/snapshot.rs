//! Bundled Server Snapshot
//!
//! A server catalog compiled into the binary, used on first run or when
//! the live feed cannot be reached.

use crate::model::ServersListResponse;
use std::path::{Path, PathBuf};
use tracing::debug;

const BUNDLED_SERVERS: &str = include_str!("../assets/servers.json");

/// Snapshot errors
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Read-only source of an offline server catalog
pub trait SnapshotLoader: Send + Sync {
    fn load(&self) -> Result<ServersListResponse, SnapshotError>;
}

/// Snapshot embedded at compile time
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddedSnapshot;

impl SnapshotLoader for EmbeddedSnapshot {
    fn load(&self) -> Result<ServersListResponse, SnapshotError> {
        debug!("Loading bundled server snapshot");
        Ok(ServersListResponse::from_json(BUNDLED_SERVERS)?)
    }
}

/// Snapshot shipped next to the application as a JSON file
#[derive(Debug, Clone)]
pub struct FileSnapshot {
    path: PathBuf,
}

impl FileSnapshot {
    pub fn new(path: &Path) -> Self {
        Self { path: path.to_path_buf() }
    }
}

impl SnapshotLoader for FileSnapshot {
    fn load(&self) -> Result<ServersListResponse, SnapshotError> {
        debug!("Loading server snapshot from {}", self.path.display());
        let content = std::fs::read_to_string(&self.path)?;
        Ok(ServersListResponse::from_json(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Protocol;

    #[test]
    fn test_embedded_snapshot_parses() {
        let snapshot = EmbeddedSnapshot.load().unwrap();

        assert!(!snapshot.servers_for(Protocol::WireGuard).is_empty());
        assert!(!snapshot.servers_for(Protocol::OpenVpn).is_empty());
        assert!(!snapshot.config.api.ips.is_empty());
        assert!(!snapshot.config.antitracker.default.ip.is_empty());
    }

    #[test]
    fn test_missing_file_snapshot() {
        let loader = FileSnapshot::new(Path::new("/nonexistent/hop/servers.json"));
        assert!(matches!(loader.load(), Err(SnapshotError::Io(_))));
    }
}
