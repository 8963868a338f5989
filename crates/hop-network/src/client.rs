//! HTTP Client
//!
//! One-shot HTTP/1.1 requests over hyper and tokio. `https` URLs are
//! wrapped in rustls with the webpki root set. Every request runs under
//! a single deadline covering connect, TLS, headers and body, and the
//! body is capped in size.

use http_body_util::{BodyExt, Empty, Limited};
use hyper::body::Bytes;
use hyper::header::{ACCEPT, CONTENT_TYPE, HOST, HeaderMap, USER_AGENT};
use hyper::{Request, StatusCode, Uri};
use hyper_util::rt::TokioIo;
use rustls::ClientConfig;
use rustls::pki_types::ServerName;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, trace, warn};

/// HTTP client errors
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timeout")]
    Timeout,

    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("TLS error: {0}")]
    TlsError(String),

    #[error("Body read error: {0}")]
    BodyError(String),
}

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Deadline for the whole request
    pub timeout: Duration,
    /// Deadline for establishing the TCP connection
    pub connect_timeout: Duration,
    pub user_agent: String,
    /// Largest accepted response body
    pub max_body_size: usize,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            user_agent: format!("hop-client/{}", env!("CARGO_PKG_VERSION")),
            max_body_size: 4 * 1024 * 1024,
        }
    }
}

/// A fully read response
#[derive(Debug)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Response {
    /// 2xx status
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Body decoded as UTF-8, invalid sequences replaced
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE)?.to_str().ok()
    }
}

/// Counters since client creation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientStats {
    pub requests: u64,
    pub bytes: u64,
}

/// Where a URL points
#[derive(Debug, PartialEq)]
struct Target {
    host: String,
    port: u16,
    tls: bool,
}

impl Target {
    fn parse(uri: &Uri) -> Result<Self, HttpError> {
        let tls = match uri.scheme_str() {
            Some("https") => true,
            Some("http") => false,
            other => {
                return Err(HttpError::InvalidUrl(format!(
                    "Unsupported scheme: {}",
                    other.unwrap_or("none")
                )));
            }
        };
        let host = uri
            .host()
            .ok_or_else(|| HttpError::InvalidUrl("No host in URL".to_string()))?
            .to_string();
        let port = uri.port_u16().unwrap_or(if tls { 443 } else { 80 });

        Ok(Self { host, port, tls })
    }

    fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// HTTP client
pub struct HttpClient {
    config: HttpClientConfig,
    tls: TlsConnector,
    requests: AtomicU64,
    bytes: AtomicU64,
}

impl HttpClient {
    pub fn new(config: HttpClientConfig) -> Self {
        debug!("HTTP client ready (timeout: {:?})", config.timeout);

        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();

        Self {
            config,
            tls: TlsConnector::from(Arc::new(tls_config)),
            requests: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(HttpClientConfig::default())
    }

    pub fn stats(&self) -> ClientStats {
        ClientStats {
            requests: self.requests.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }

    /// GET `url` within the configured deadline
    pub async fn get(&self, url: &str) -> Result<Response, HttpError> {
        let uri: Uri = url
            .parse()
            .map_err(|e: hyper::http::uri::InvalidUri| HttpError::InvalidUrl(e.to_string()))?;
        let target = Target::parse(&uri)?;
        self.requests.fetch_add(1, Ordering::Relaxed);

        match tokio::time::timeout(self.config.timeout, self.fetch(&uri, &target)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("GET {} timed out after {:?}", url, self.config.timeout);
                Err(HttpError::Timeout)
            }
        }
    }

    async fn fetch(&self, uri: &Uri, target: &Target) -> Result<Response, HttpError> {
        let start = Instant::now();

        let request = Request::get(uri)
            .header(HOST, target.host.as_str())
            .header(USER_AGENT, self.config.user_agent.as_str())
            .header(ACCEPT, "application/json")
            .body(Empty::<Bytes>::new())
            .map_err(|e| HttpError::HttpError(e.to_string()))?;

        let stream = tokio::time::timeout(
            self.config.connect_timeout,
            TcpStream::connect(target.authority()),
        )
        .await
        .map_err(|_| HttpError::Timeout)?
        .map_err(|e| HttpError::ConnectionFailed(e.to_string()))?;
        trace!("Connected to {}", target.authority());

        let response = if target.tls {
            let name = ServerName::try_from(target.host.clone())
                .map_err(|_| HttpError::TlsError(format!("Invalid server name {}", target.host)))?;
            let stream = self
                .tls
                .connect(name, stream)
                .await
                .map_err(|e| HttpError::TlsError(e.to_string()))?;
            Self::exchange(stream, request).await?
        } else {
            Self::exchange(stream, request).await?
        };

        let status = response.status();
        let headers = response.headers().clone();
        let body = Limited::new(response.into_body(), self.config.max_body_size)
            .collect()
            .await
            .map_err(|e| HttpError::BodyError(e.to_string()))?
            .to_bytes();

        self.bytes.fetch_add(body.len() as u64, Ordering::Relaxed);
        let elapsed = start.elapsed();
        debug!(
            "GET {} -> {} ({} bytes, {:?})",
            uri,
            status,
            body.len(),
            elapsed
        );

        Ok(Response {
            status,
            headers,
            body,
        })
    }

    /// Run one HTTP/1.1 exchange over an established stream
    async fn exchange<S>(
        stream: S,
        request: Request<Empty<Bytes>>,
    ) -> Result<hyper::Response<hyper::body::Incoming>, HttpError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut sender, connection) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .map_err(|e| HttpError::HttpError(e.to_string()))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!("Connection closed with error: {}", e);
            }
        });

        sender
            .send_request(request)
            .await
            .map_err(|e| HttpError::HttpError(e.to_string()))
    }
}
