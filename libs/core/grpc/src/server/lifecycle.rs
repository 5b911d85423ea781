use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinSet};
use tokio_rustls::TlsAcceptor;
use tokio_stream::wrappers::ReceiverStream;
use tonic::service::Routes;
use tonic::transport::Server;
use tracing::{debug, error, info, warn};

use super::config::ServerConfig;
use super::health::HealthHook;
use super::io::{Connections, accept_loop, shutdown_requested};
use crate::credentials::ServerCredentials;
use crate::error::{ServerError, ServerResult};
use crate::tls;

/// Accepted connections waiting for tonic to pick them up, per binding.
const ACCEPT_BACKLOG: usize = 128;

/// Where a [`GrpcServer`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Created,
    Bound,
    Started,
    ShuttingDown,
    Stopped,
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServerState::Created => "created",
            ServerState::Bound => "bound",
            ServerState::Started => "started",
            ServerState::ShuttingDown => "shutting down",
            ServerState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// A listening address and the credentials it serves with.
pub struct Binding {
    address: String,
    local_addr: SocketAddr,
    credentials: ServerCredentials,
    listener: Option<TcpListener>,
    acceptor: Option<TlsAcceptor>,
}

impl Binding {
    /// Address as passed to [`GrpcServer::bind`].
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn credentials(&self) -> &ServerCredentials {
        &self.credentials
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("address", &self.address)
            .field("local_addr", &self.local_addr)
            .field("secure", &self.credentials.is_secure())
            .finish()
    }
}

/// A gRPC server driven through bind, start and shutdown.
///
/// One server owns any number of bindings; each serves the same routes.
///
/// # Example
///
/// ```ignore
/// use grpc_credentials::server::{GrpcServer, HealthHook, ServerConfig, create_health_service};
/// use grpc_credentials::create_insecure;
/// use tonic::service::Routes;
///
/// let config = ServerConfig::from_env()?;
/// let (reporter, health_service) = create_health_service();
///
/// let mut server = GrpcServer::new(config.clone(), Routes::new(health_service))
///     .with_health(HealthHook::new(reporter, [SERVICE_NAME]));
///
/// let port = server.bind(&config.addr_string(), create_insecure()).await?;
/// server.serve_until(shutdown_signal()).await?;
/// ```
pub struct GrpcServer {
    config: ServerConfig,
    routes: Routes,
    health: Option<HealthHook>,
    state: ServerState,
    bindings: Vec<Binding>,
    tasks: JoinSet<()>,
    connections: Connections,
    shutdown: watch::Sender<bool>,
}

impl GrpcServer {
    pub fn new(config: ServerConfig, routes: Routes) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            routes,
            health: None,
            state: ServerState::Created,
            bindings: Vec::new(),
            tasks: JoinSet::new(),
            connections: Connections::default(),
            shutdown,
        }
    }

    /// Report health through `hook`: serving once started, not serving once
    /// shutdown begins.
    pub fn with_health(mut self, hook: HealthHook) -> Self {
        self.health = Some(hook);
        self
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.bindings.iter().map(Binding::local_addr).collect()
    }

    /// Connections currently accepted and not yet closed.
    pub fn open_connections(&self) -> usize {
        self.connections.len()
    }

    /// Listen on `address` with `credentials`.
    ///
    /// Returns the bound port, which is the OS-assigned one when `address`
    /// asks for port 0. Only allowed before [`start`](Self::start).
    pub async fn bind(&mut self, address: &str, credentials: ServerCredentials) -> ServerResult<u16> {
        if !matches!(self.state, ServerState::Created | ServerState::Bound) {
            return Err(self.illegal_state("bind"));
        }

        let acceptor = match credentials.settings() {
            Some(settings) => {
                let config = tls::server_config(settings).map_err(|source| ServerError::Tls {
                    address: address.to_string(),
                    source,
                })?;
                Some(TlsAcceptor::from(config))
            }
            None => None,
        };

        let listener = TcpListener::bind(address).await.map_err(|source| {
            warn!(target: "grpc_server", address, error = %source, "bind failed");
            ServerError::Bind {
                address: address.to_string(),
                source,
            }
        })?;
        let local_addr = listener.local_addr().map_err(|source| ServerError::Bind {
            address: address.to_string(),
            source,
        })?;

        info!(
            target: "grpc_server",
            address,
            %local_addr,
            secure = credentials.is_secure(),
            "gRPC server bound"
        );

        self.bindings.push(Binding {
            address: address.to_string(),
            local_addr,
            credentials,
            listener: Some(listener),
            acceptor,
        });
        self.state = ServerState::Bound;

        Ok(local_addr.port())
    }

    /// Begin serving on every binding.
    ///
    /// Only allowed once, after at least one successful [`bind`](Self::bind).
    pub async fn start(&mut self) -> ServerResult<()> {
        if self.state != ServerState::Bound {
            return Err(self.illegal_state("start"));
        }

        for binding in &mut self.bindings {
            let Some(listener) = binding.listener.take() else {
                continue;
            };

            let (tx, rx) = mpsc::channel(ACCEPT_BACKLOG);
            self.tasks.spawn(accept_loop(
                listener,
                binding.acceptor.clone(),
                self.connections.clone(),
                tx,
                self.shutdown.subscribe(),
                self.config.handshake_timeout,
            ));

            let router = transport(&self.config).add_routes(self.routes.clone());
            let signal = shutdown_requested(self.shutdown.subscribe());
            let local_addr = binding.local_addr;
            self.tasks.spawn(async move {
                if let Err(err) = router
                    .serve_with_incoming_shutdown(ReceiverStream::new(rx), signal)
                    .await
                {
                    error!(target: "grpc_server", %local_addr, error = %err, "gRPC transport failed");
                }
            });

            info!(
                target: "grpc_server",
                %local_addr,
                secure = binding.credentials.is_secure(),
                "gRPC server starting"
            );
        }

        self.state = ServerState::Started;
        if let Some(health) = &mut self.health {
            health.set_serving().await;
        }
        Ok(())
    }

    /// Stop accepting connections and wait for in-flight calls to finish.
    ///
    /// Never fails and may be called in any state. If the returned future is
    /// dropped the server stays [`ShuttingDown`](ServerState::ShuttingDown)
    /// and a later call resumes waiting.
    pub async fn try_shutdown(&mut self) {
        match self.state {
            ServerState::Stopped => return,
            ServerState::Created | ServerState::Bound => {
                self.finish();
                return;
            }
            ServerState::Started => {
                info!(target: "grpc_server", "Initiating graceful shutdown");
                self.state = ServerState::ShuttingDown;
                if let Some(health) = &mut self.health {
                    health.set_not_serving().await;
                }
            }
            ServerState::ShuttingDown => {}
        }

        self.shutdown.send_replace(true);
        while let Some(joined) = self.tasks.join_next().await {
            log_task_exit(joined);
        }
        self.finish();
    }

    /// Stop immediately, closing every open connection.
    ///
    /// Calls still in flight fail on the client side.
    pub async fn force_shutdown(&mut self) {
        if self.state == ServerState::Stopped {
            return;
        }

        if self.state == ServerState::Started {
            if let Some(health) = &mut self.health {
                health.set_not_serving().await;
            }
        }
        self.state = ServerState::ShuttingDown;
        self.shutdown.send_replace(true);

        self.tasks.abort_all();
        let aborted = self.connections.abort_all();
        warn!(target: "grpc_server", connections = aborted, "Forcing shutdown");

        while let Some(joined) = self.tasks.join_next().await {
            log_task_exit(joined);
        }
        self.finish();
    }

    /// Graceful shutdown bounded by `timeout`, forced past it.
    ///
    /// Returns `true` if the graceful shutdown completed in time.
    pub async fn shutdown_with_timeout(&mut self, timeout: Duration) -> bool {
        if tokio::time::timeout(timeout, self.try_shutdown()).await.is_ok() {
            return true;
        }
        warn!(target: "grpc_server", ?timeout, "graceful shutdown timed out");
        self.force_shutdown().await;
        false
    }

    /// Start, wait for `signal`, then shut down within the configured
    /// shutdown timeout.
    pub async fn serve_until<F>(&mut self, signal: F) -> ServerResult<()>
    where
        F: Future<Output = ()>,
    {
        self.start().await?;
        signal.await;
        self.shutdown_with_timeout(self.config.shutdown_timeout).await;
        Ok(())
    }

    fn illegal_state(&self, operation: &'static str) -> ServerError {
        debug!(target: "grpc_server", operation, state = %self.state, "rejected lifecycle call");
        ServerError::IllegalState {
            operation,
            state: self.state,
        }
    }

    fn finish(&mut self) {
        self.bindings.clear();
        self.state = ServerState::Stopped;
        info!(target: "grpc_server", "gRPC server stopped");
    }
}

impl Drop for GrpcServer {
    fn drop(&mut self) {
        if matches!(self.state, ServerState::Started | ServerState::ShuttingDown) {
            let aborted = self.connections.abort_all();
            debug!(target: "grpc_server", connections = aborted, "server dropped while running");
        }
    }
}

fn transport(config: &ServerConfig) -> Server {
    Server::builder()
        .http2_keepalive_interval(Some(config.keepalive()))
        .max_concurrent_streams(config.max_concurrent_streams)
}

fn log_task_exit(joined: Result<(), JoinError>) {
    if let Err(err) = joined {
        if err.is_panic() {
            error!(target: "grpc_server", error = %err, "serving task panicked");
        }
    }
}

/// Resolves on SIGINT (Ctrl+C) or SIGTERM.
///
/// Suitable for [`GrpcServer::serve_until`].
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(target: "grpc_server", error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(target: "grpc_server", error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!(target: "grpc_server", "Received Ctrl+C signal, shutting down gracefully");
        },
        _ = terminate => {
            info!(target: "grpc_server", "Received SIGTERM signal, shutting down gracefully");
        },
    }
}
