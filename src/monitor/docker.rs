//! Container runtime capability and a Docker Engine API client

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::MonitorError;

const DEFAULT_DOCKER_HOST: &str = "unix:///var/run/docker.sock";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Container state as reported by the runtime
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerSummary {
    pub id: String,
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub state: String,
}

impl ContainerSummary {
    /// Primary name without the leading `/` the engine adds
    pub fn name(&self) -> &str {
        self.names
            .first()
            .map(|n| n.strip_prefix('/').unwrap_or(n))
            .unwrap_or("")
    }
}

/// One-shot stats sample; only the reporting OS is inspected
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerStats {
    pub os_type: String,
}

/// Access to a container engine
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// List containers, including stopped ones when `all` is set
    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerSummary>, MonitorError>;

    async fn container_stats(&self, id: &str) -> Result<ContainerStats, MonitorError>;

    async fn close(&self) -> Result<(), MonitorError>;
}

/// Where engine requests go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Engine API over HTTP, e.g. `http://10.0.0.5:2375`
    Http(String),
    /// Engine API on a local Unix socket
    Unix(PathBuf),
}

impl Endpoint {
    /// Parse a Docker host string (`unix://`, `tcp://`, `http://`, `https://`)
    pub fn parse(endpoint: &str) -> Result<Self, MonitorError> {
        let endpoint = endpoint.trim();
        if let Some(path) = endpoint.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(MonitorError::DependencyUnavailable(
                    "unix:// Docker endpoint has no socket path".to_string(),
                ));
            }
            return Ok(Endpoint::Unix(PathBuf::from(path)));
        }

        let endpoint = endpoint.trim_end_matches('/');
        if let Some(rest) = endpoint.strip_prefix("tcp://") {
            Ok(Endpoint::Http(format!("http://{}", rest)))
        } else if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            Ok(Endpoint::Http(endpoint.to_string()))
        } else {
            Err(MonitorError::DependencyUnavailable(format!(
                "unsupported Docker endpoint {:?}, expected unix://, tcp:// or http(s)://",
                endpoint
            )))
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Http(url) => f.write_str(url),
            Endpoint::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

/// Status, `Server` header and body of one engine reply
struct EngineResponse {
    status: u16,
    server: Option<String>,
    body: Vec<u8>,
}

/// [`ContainerRuntime`] speaking the Docker Engine API
///
/// Unix socket endpoints use a minimal HTTP/1.0 exchange per request; TCP and
/// HTTP endpoints go through a pooled `reqwest` client.
pub struct DockerClient {
    endpoint: Endpoint,
    client: reqwest::Client,
    closed: AtomicBool,
}

impl DockerClient {
    /// Client for `endpoint`, or for `DOCKER_HOST` when none is given,
    /// falling back to the local engine socket. No connection is made here.
    pub fn new(endpoint: Option<&str>) -> Result<Self, MonitorError> {
        let env_host = std::env::var("DOCKER_HOST").ok();
        let endpoint = endpoint
            .or(env_host.as_deref())
            .unwrap_or(DEFAULT_DOCKER_HOST);
        let endpoint = Endpoint::parse(endpoint)?;

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| MonitorError::DependencyUnavailable(format!("Docker client: {}", e)))?;

        tracing::info!(endpoint = %endpoint, "Docker client configured");

        Ok(Self {
            endpoint,
            client,
            closed: AtomicBool::new(false),
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn get(&self, path: &str) -> Result<EngineResponse, MonitorError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MonitorError::DependencyUnavailable(
                "Docker client is closed".to_string(),
            ));
        }

        let response = match &self.endpoint {
            Endpoint::Http(base_url) => self.get_http(base_url, path).await?,
            #[cfg(unix)]
            Endpoint::Unix(socket) => {
                tokio::time::timeout(REQUEST_TIMEOUT, get_unix(socket, path))
                    .await
                    .map_err(|_| {
                        MonitorError::Runtime(format!(
                            "GET {} timed out after {:?}",
                            path, REQUEST_TIMEOUT
                        ))
                    })??
            }
            #[cfg(not(unix))]
            Endpoint::Unix(socket) => {
                return Err(MonitorError::DependencyUnavailable(format!(
                    "Unix socket {} is not supported on this platform",
                    socket.display()
                )))
            }
        };

        if !(200..300).contains(&response.status) {
            return Err(MonitorError::Runtime(format!(
                "GET {} returned status {}",
                path, response.status
            )));
        }

        Ok(response)
    }

    async fn get_http(&self, base_url: &str, path: &str) -> Result<EngineResponse, MonitorError> {
        let url = format!("{}{}", base_url, path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| MonitorError::Runtime(format!("GET {} failed: {}", path, e)))?;

        let status = response.status().as_u16();
        let server = response
            .headers()
            .get(reqwest::header::SERVER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|e| MonitorError::Runtime(format!("Failed to read {}: {}", path, e)))?;

        Ok(EngineResponse {
            status,
            server,
            body: body.to_vec(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, MonitorError> {
        let response = self.get(path).await?;
        serde_json::from_slice(&response.body)
            .map_err(|e| MonitorError::Runtime(format!("Invalid response from {}: {}", path, e)))
    }
}

/// One HTTP/1.0 GET over the engine socket; the engine closes after replying
#[cfg(unix)]
async fn get_unix(socket: &std::path::Path, path: &str) -> Result<EngineResponse, MonitorError> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let mut stream = tokio::net::UnixStream::connect(socket).await.map_err(|e| {
        MonitorError::Runtime(format!(
            "Failed to connect to Docker socket {}: {}",
            socket.display(),
            e
        ))
    })?;

    let request = format!("GET {} HTTP/1.0\r\nHost: localhost\r\n\r\n", path);
    stream
        .write_all(request.as_bytes())
        .await
        .map_err(|e| MonitorError::Runtime(format!("Failed to write request: {}", e)))?;

    let mut raw = Vec::new();
    stream
        .read_to_end(&mut raw)
        .await
        .map_err(|e| MonitorError::Runtime(format!("Failed to read response: {}", e)))?;

    parse_response(&raw)
}

/// Split a raw HTTP/1.x reply into status, `Server` header and body
fn parse_response(raw: &[u8]) -> Result<EngineResponse, MonitorError> {
    let split = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .ok_or_else(|| MonitorError::Runtime("Invalid HTTP response from Docker".to_string()))?;
    let head = String::from_utf8_lossy(&raw[..split]);
    let mut lines = head.split("\r\n");

    let status = lines
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| MonitorError::Runtime(format!("Invalid status line in {:?}", head)))?;

    let server = lines.find_map(|line| {
        let (name, value) = line.split_once(':')?;
        name.trim()
            .eq_ignore_ascii_case("server")
            .then(|| value.trim().to_string())
    });

    Ok(EngineResponse {
        status,
        server,
        body: raw[split + 4..].to_vec(),
    })
}

#[async_trait]
impl ContainerRuntime for DockerClient {
    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerSummary>, MonitorError> {
        self.get_json(&format!("/containers/json?all={}", all)).await
    }

    async fn container_stats(&self, id: &str) -> Result<ContainerStats, MonitorError> {
        let response = self
            .get(&format!("/containers/{}/stats?stream=false", id))
            .await?;

        // The engine reports its OS in the Server header, e.g. "Docker/24.0.7 (linux)"
        let os_type = response.server.as_deref().map(server_os).unwrap_or_default();
        Ok(ContainerStats { os_type })
    }

    async fn close(&self) -> Result<(), MonitorError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!(endpoint = %self.endpoint, "Docker client closed");
        }
        Ok(())
    }
}

fn server_os(server: &str) -> String {
    server
        .rsplit_once('(')
        .and_then(|(_, rest)| rest.split_once(')'))
        .map(|(os, _)| os.trim().to_string())
        .unwrap_or_default()
}
