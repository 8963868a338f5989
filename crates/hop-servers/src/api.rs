//! Server List API
//!
//! Abstract "list servers" call plus its HTTP implementation. The
//! repository only consumes the parsed [`ServersListResponse`]; framing
//! and transport belong to the implementation.

use crate::model::ServersListResponse;
use async_trait::async_trait;
use hop_network::{HttpClient, HttpClientConfig, HttpError};
use std::time::Duration;
use tracing::debug;

/// Default server-list endpoint
pub const DEFAULT_API_URL: &str = "https://api.hopvpn.net/v4/servers.json";

/// Server-list fetch errors
#[derive(Debug, thiserror::Error)]
pub enum ServerListError {
    /// Network unreachable, TLS failure, connection reset...
    #[error("Transport error: {0}")]
    Transport(#[from] HttpError),

    #[error("Server list request timed out after {0:?}")]
    Timeout(Duration),

    /// The API answered with a non-success status
    #[error("Server list request failed ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid server list: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ServerListError {
    /// Whether the failure happened below the application layer
    pub fn is_transport(&self) -> bool {
        matches!(self, ServerListError::Transport(_) | ServerListError::Timeout(_))
    }
}

/// Network fetch boundary
#[async_trait]
pub trait ServerListApi: Send + Sync {
    async fn list_servers(&self) -> Result<ServersListResponse, ServerListError>;
}

/// Fetches the catalog over HTTPS
pub struct HttpServerListApi {
    client: HttpClient,
    url: String,
}

impl HttpServerListApi {
    pub fn new(url: &str, timeout: Duration) -> Self {
        let client = HttpClient::new(HttpClientConfig {
            timeout,
            ..HttpClientConfig::default()
        });
        Self {
            client,
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl ServerListApi for HttpServerListApi {
    async fn list_servers(&self) -> Result<ServersListResponse, ServerListError> {
        let response = self.client.get(&self.url).await?;

        if !response.is_success() {
            let message: String = response.text().chars().take(256).collect();
            return Err(ServerListError::Api {
                status: response.status.as_u16(),
                message,
            });
        }

        let parsed: ServersListResponse = serde_json::from_slice(&response.body)?;
        debug!(
            "Fetched server list: {} OpenVPN, {} WireGuard",
            parsed.openvpn.len(),
            parsed.wireguard.len()
        );
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await.unwrap();
            let reply = format!(
                "HTTP/1.1 {}\r\nContent-Length: {}\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(reply.as_bytes()).await.unwrap();
        });

        format!("http://{}/v4/servers.json", addr)
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let url = serve_once(
            "200 OK",
            r#"{"wireguard":[{"gateway":"se.wg","country_code":"SE","country":"Sweden","city":"Stockholm"}],"openvpn":[],"config":{"antitracker":{"default":{"ip":"10.0.254.2"},"hardcore":{"ip":"10.0.254.3"}},"api":{"ips":[]}}}"#,
        )
        .await;

        let api = HttpServerListApi::new(&url, Duration::from_secs(5));
        let response = api.list_servers().await.unwrap();
        assert_eq!(response.wireguard.len(), 1);
        assert!(response.openvpn.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_api_error() {
        let url = serve_once("503 Service Unavailable", "maintenance").await;

        let api = HttpServerListApi::new(&url, Duration::from_secs(5));
        match api.list_servers().await {
            Err(ServerListError::Api { status, message }) => {
                assert_eq!(status, 503);
                assert_eq!(message, "maintenance");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_decode_error() {
        let url = serve_once("200 OK", "<html>captive portal</html>").await;

        let api = HttpServerListApi::new(&url, Duration::from_secs(5));
        let result = api.list_servers().await;
        assert!(matches!(result, Err(ServerListError::Decode(_))));
        assert!(!result.unwrap_err().is_transport());
    }
}
