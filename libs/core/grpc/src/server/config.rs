//! Server configuration loaded from environment variables.

use std::env;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use bytes::Bytes;

use crate::credentials::{KeyCertPair, RawValue, ServerCredentials, create_insecure, create_ssl};
use crate::error::ConfigError;

/// Configuration for gRPC server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to (default: [::1] for IPv6 localhost)
    pub host: String,
    /// Port to listen on (default: 50051)
    pub port: u16,
    /// Maximum message size services should accept and emit (default: 8MB)
    pub max_message_size: usize,
    /// HTTP/2 keepalive interval in seconds (default: 60)
    pub keepalive_secs: u64,
    /// Concurrent streams per connection (default: unlimited)
    pub max_concurrent_streams: Option<u32>,
    /// Time a client gets to finish the TLS handshake (default: 10s)
    pub handshake_timeout: Duration,
    /// Grace period before a graceful shutdown turns forced (default: 30s)
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "[::1]".to_string(),
            port: 50051,
            max_message_size: 8 * 1024 * 1024, // 8MB
            keepalive_secs: 60,
            max_concurrent_streams: None,
            handshake_timeout: Duration::from_secs(10),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl ServerConfig {
    /// Create a new server config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables.
    ///
    /// Reads:
    /// - `GRPC_HOST` (default: [::1])
    /// - `GRPC_PORT` (default: 50051)
    /// - `GRPC_MAX_MESSAGE_SIZE` (default: 8388608 / 8MB)
    /// - `GRPC_KEEPALIVE_SECS` (default: 60)
    /// - `GRPC_MAX_CONCURRENT_STREAMS` (default: unset)
    /// - `GRPC_TLS_HANDSHAKE_TIMEOUT_SECS` (default: 10)
    /// - `GRPC_SHUTDOWN_TIMEOUT_SECS` (default: 30)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            host: env_or_default("GRPC_HOST", &defaults.host),
            port: parse_or("GRPC_PORT", defaults.port)?,
            max_message_size: parse_or("GRPC_MAX_MESSAGE_SIZE", defaults.max_message_size)?,
            keepalive_secs: parse_or("GRPC_KEEPALIVE_SECS", defaults.keepalive_secs)?,
            max_concurrent_streams: parse_optional("GRPC_MAX_CONCURRENT_STREAMS")?,
            handshake_timeout: Duration::from_secs(parse_or(
                "GRPC_TLS_HANDSHAKE_TIMEOUT_SECS",
                defaults.handshake_timeout.as_secs(),
            )?),
            shutdown_timeout: Duration::from_secs(parse_or(
                "GRPC_SHUTDOWN_TIMEOUT_SECS",
                defaults.shutdown_timeout.as_secs(),
            )?),
        })
    }

    /// Set the host to bind to.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the port to listen on.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set maximum message size.
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    pub fn with_max_concurrent_streams(mut self, streams: u32) -> Self {
        self.max_concurrent_streams = Some(streams);
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Get the address string, as handed to [`GrpcServer::bind`](super::GrpcServer::bind).
    pub fn addr_string(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs)
    }
}

/// Locations of the PEM files a secure binding is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsFiles {
    pub cert: PathBuf,
    pub key: PathBuf,
    /// Root bundle for client verification; system roots when unset
    pub ca: Option<PathBuf>,
    pub client_auth: bool,
}

impl TlsFiles {
    pub fn new(cert: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        Self {
            cert: cert.into(),
            key: key.into(),
            ca: None,
            client_auth: false,
        }
    }

    /// Require client certificates chaining to the bundle at `ca`.
    pub fn with_client_auth(mut self, ca: impl Into<PathBuf>) -> Self {
        self.ca = Some(ca.into());
        self.client_auth = true;
        self
    }

    /// Load TLS file locations from environment variables.
    ///
    /// Returns `None` when `GRPC_TLS_CERT` is unset, meaning plaintext.
    ///
    /// Reads:
    /// - `GRPC_TLS_CERT` - certificate chain (PEM)
    /// - `GRPC_TLS_KEY` - private key (PEM), required with `GRPC_TLS_CERT`
    /// - `GRPC_TLS_CA` - client root bundle (PEM, optional)
    /// - `GRPC_TLS_CLIENT_AUTH` - require client certificates (default: false)
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let Ok(cert) = env::var("GRPC_TLS_CERT") else {
            return Ok(None);
        };
        let key = env_required("GRPC_TLS_KEY")?;
        let ca = env::var("GRPC_TLS_CA").ok().map(PathBuf::from);
        let client_auth = env::var("GRPC_TLS_CLIENT_AUTH")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(false);

        Ok(Some(Self {
            cert: cert.into(),
            key: key.into(),
            ca,
            client_auth,
        }))
    }

    /// Read the files and build validated secure credentials from them.
    pub fn load(&self) -> Result<ServerCredentials, ConfigError> {
        let root_certs = self.ca.as_deref().map(read_pem).transpose()?;
        let pair = KeyCertPair::new(read_pem(&self.key)?, read_pem(&self.cert)?);

        let credentials = create_ssl(root_certs, vec![pair], Some(RawValue::Bool(self.client_auth)))?;
        tracing::debug!(
            target: "grpc_server",
            cert = %self.cert.display(),
            client_auth = self.client_auth,
            "loaded TLS credentials"
        );
        Ok(credentials)
    }
}

/// Secure credentials when `GRPC_TLS_CERT` is set, insecure otherwise.
pub fn credentials_from_env() -> Result<ServerCredentials, ConfigError> {
    match TlsFiles::from_env()? {
        Some(files) => files.load(),
        None => Ok(create_insecure()),
    }
}

fn read_pem(path: &Path) -> Result<Bytes, ConfigError> {
    std::fs::read(path)
        .map(Bytes::from)
        .map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })
}

fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_required(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

fn parse_or<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    Ok(parse_optional(key)?.unwrap_or(default))
}

fn parse_optional<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    env::var(key)
        .ok()
        .map(|raw| {
            raw.parse().map_err(|e| ConfigError::ParseError {
                key: key.to_string(),
                details: format!("{}", e),
            })
        })
        .transpose()
}
