//! Minimal HTTPS client for the control-plane REST API.
//!
//! Every call opens a fresh TLS connection, performs one HTTP/1.1
//! exchange with hyper and drops the connection. The whole exchange
//! (connect, handshake, request, body) is bounded by a single timeout.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::header::{ACCEPT, CONTENT_TYPE, HOST, USER_AGENT};
use http::{Method, Request, Uri};
use http_body_util::{BodyExt, Full};
use hyper_util::rt::TokioIo;
use rustls::ClientConfig;
use rustls::pki_types::ServerName;
use serde::de::DeserializeOwned;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

use kdeploy_core::ConnectionConfig;

use crate::error::{ClientError, ClientResult};
use crate::tls;

const USER_AGENT_VALUE: &str = concat!("kdeploy/", env!("CARGO_PKG_VERSION"));

/// A raw control-plane response.
#[derive(Debug, Clone)]
pub struct RestResponse {
    pub status: u16,
    pub body: Bytes,
}

impl RestResponse {
    /// `200 OK` and `201 Created`; every other status is a failure.
    pub fn is_success(&self) -> bool {
        matches!(self.status, 200 | 201)
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self, operation: &str) -> ClientResult<T> {
        serde_json::from_slice(&self.body).map_err(|source| ClientError::Decode {
            operation: operation.to_string(),
            source,
        })
    }
}

/// HTTPS client bound to one API endpoint.
#[derive(Clone)]
pub struct RestClient {
    endpoint: String,
    host: String,
    port: u16,
    authority: String,
    base_path: String,
    server_name: ServerName<'static>,
    connector: TlsConnector,
    timeout: Duration,
}

impl RestClient {
    /// Build a client from connection settings, loading the PEM material.
    pub fn new(config: &ConnectionConfig) -> ClientResult<Self> {
        let tls = tls::client_config(&config.cert, &config.key, &config.ca_cert)?;
        Self::with_tls(&config.endpoint(), tls, config.request_timeout())
    }

    /// Build a client from an already assembled TLS configuration.
    pub fn with_tls(endpoint: &str, tls: Arc<ClientConfig>, timeout: Duration) -> ClientResult<Self> {
        let invalid = |reason: &str| ClientError::Endpoint {
            endpoint: endpoint.to_string(),
            reason: reason.to_string(),
        };

        let uri: Uri = endpoint
            .parse()
            .map_err(|e: http::uri::InvalidUri| invalid(&e.to_string()))?;
        if uri.scheme_str() != Some("https") {
            return Err(invalid("only https endpoints are supported"));
        }
        let authority = uri
            .authority()
            .ok_or_else(|| invalid("missing host"))?
            .to_string();
        let host = uri
            .host()
            .ok_or_else(|| invalid("missing host"))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        let port = uri.port_u16().unwrap_or(443);
        let server_name = ServerName::try_from(host.as_str())
            .map_err(|e| invalid(&e.to_string()))?
            .to_owned();

        let mut base_path = uri.path().to_string();
        if !base_path.ends_with('/') {
            base_path.push('/');
        }

        Ok(Self {
            endpoint: endpoint.to_string(),
            host,
            port,
            authority,
            base_path,
            server_name,
            connector: TlsConnector::from(tls),
            timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn get(&self, path: &str) -> ClientResult<RestResponse> {
        self.send(Method::GET, path, None).await
    }

    pub async fn post_json(&self, path: &str, body: &serde_json::Value) -> ClientResult<RestResponse> {
        let bytes = Bytes::from(body.to_string());
        self.send(Method::POST, path, Some(("application/json", bytes)))
            .await
    }

    /// JSON merge patch (RFC 7386).
    pub async fn merge_patch(&self, path: &str, body: &serde_json::Value) -> ClientResult<RestResponse> {
        let bytes = Bytes::from(body.to_string());
        self.send(
            Method::PATCH,
            path,
            Some(("application/merge-patch+json", bytes)),
        )
        .await
    }

    /// JSON patch (RFC 6902). `ops` is the array of operations.
    pub async fn json_patch(
        &self,
        path: &str,
        ops: &serde_json::Value,
    ) -> ClientResult<RestResponse> {
        let bytes = Bytes::from(ops.to_string());
        self.send(
            Method::PATCH,
            path,
            Some(("application/json-patch+json", bytes)),
        )
        .await
    }

    pub async fn delete(&self, path: &str) -> ClientResult<RestResponse> {
        self.send(Method::DELETE, path, None).await
    }

    /// Perform one exchange. `path` is relative to the endpoint.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<(&'static str, Bytes)>,
    ) -> ClientResult<RestResponse> {
        let operation = format!("{method} {}", path.split('?').next().unwrap_or(path));
        let started = Instant::now();

        let response = match tokio::time::timeout(
            self.timeout,
            self.exchange(method, path, body, &operation),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(ClientError::RequestTimeout {
                    operation,
                    timeout: self.timeout,
                });
            }
        };

        debug!(
            %operation,
            status = response.status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "control-plane request"
        );
        Ok(response)
    }

    async fn exchange(
        &self,
        method: Method,
        path: &str,
        body: Option<(&'static str, Bytes)>,
        operation: &str,
    ) -> ClientResult<RestResponse> {
        let transport = |reason: String| ClientError::Transport {
            operation: operation.to_string(),
            reason,
        };

        let stream = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(|e| transport(format!("connect {}: {e}", self.authority)))?;
        let stream = self
            .connector
            .connect(self.server_name.clone(), stream)
            .await
            .map_err(|e| transport(format!("tls handshake: {e}")))?;

        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .map_err(|e| transport(format!("http handshake: {e}")))?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "control-plane connection closed with error");
            }
        });

        let mut builder = Request::builder()
            .method(method)
            .uri(format!("{}{path}", self.base_path))
            .header(HOST, self.authority.as_str())
            .header(USER_AGENT, USER_AGENT_VALUE)
            .header(ACCEPT, "application/json");
        let payload = match body {
            Some((content_type, bytes)) => {
                builder = builder.header(CONTENT_TYPE, content_type);
                bytes
            }
            None => Bytes::new(),
        };
        let request = builder
            .body(Full::new(payload))
            .map_err(|e| transport(format!("build request: {e}")))?;

        let response = sender
            .send_request(request)
            .await
            .map_err(|e| transport(format!("send request: {e}")))?;
        let status = response.status().as_u16();
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| transport(format!("read body: {e}")))?
            .to_bytes();

        Ok(RestResponse { status, body })
    }
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .finish()
    }
}
