//! Accepted connections as handed to tonic.

use std::collections::HashMap;
use std::io;
use std::net::{Shutdown, SocketAddr};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use rustls::pki_types::CertificateDer;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::server::TlsStream;
use tonic::transport::server::{Connected, TcpConnectInfo};
use tracing::{debug, warn};

/// Certificate chain a client presented during the TLS handshake.
pub type PeerCertificates = Arc<Vec<CertificateDer<'static>>>;

/// Registry of open connections, so they can be torn down without waiting
/// for tonic to drain them.
#[derive(Clone, Default)]
pub(crate) struct Connections {
    inner: Arc<Mutex<Registry>>,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    open: HashMap<u64, std::net::TcpStream>,
}

impl Connections {
    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `stream`, keeping a duplicate handle for [`abort_all`](Self::abort_all).
    fn track(&self, stream: TcpStream) -> io::Result<(TcpStream, Tracked)> {
        let std_stream = stream.into_std()?;
        let handle = std_stream.try_clone()?;
        let stream = TcpStream::from_std(std_stream)?;

        let mut registry = self.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.open.insert(id, handle);

        Ok((
            stream,
            Tracked {
                id,
                connections: self.clone(),
            },
        ))
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().open.len()
    }

    /// Shut down every open socket in both directions. Returns how many were
    /// open.
    pub(crate) fn abort_all(&self) -> usize {
        let open: Vec<_> = self.lock().open.drain().collect();
        for (id, socket) in &open {
            if let Err(err) = socket.shutdown(Shutdown::Both) {
                debug!(target: "grpc_server", connection = id, error = %err, "socket already closed");
            }
        }
        open.len()
    }
}

/// Removes its connection from the registry when dropped.
struct Tracked {
    id: u64,
    connections: Connections,
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.connections.lock().open.remove(&self.id);
    }
}

enum Stream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

/// Connection details tonic attaches to every request's extensions.
///
/// ```ignore
/// let identity = request
///     .extensions()
///     .get::<ServerConnectInfo>()
///     .and_then(ServerConnectInfo::peer_certificates);
/// ```
#[derive(Debug, Clone)]
pub struct ServerConnectInfo {
    tcp: TcpConnectInfo,
    peer_certificates: Option<PeerCertificates>,
}

impl ServerConnectInfo {
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.tcp.local_addr()
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.tcp.remote_addr()
    }

    /// Client certificate chain, leaf first. `None` on plaintext bindings
    /// and when the client sent no certificate.
    pub fn peer_certificates(&self) -> Option<&[CertificateDer<'static>]> {
        self.peer_certificates.as_deref().map(Vec::as_slice)
    }
}

/// One accepted connection, plaintext or TLS.
pub(crate) struct ServerIo {
    stream: Stream,
    peer_certificates: Option<PeerCertificates>,
    _tracked: Tracked,
}

impl ServerIo {
    fn plain(stream: TcpStream, tracked: Tracked) -> Self {
        Self {
            stream: Stream::Plain(stream),
            peer_certificates: None,
            _tracked: tracked,
        }
    }

    fn tls(stream: TlsStream<TcpStream>, tracked: Tracked) -> Self {
        let peer_certificates = stream
            .get_ref()
            .1
            .peer_certificates()
            .map(|chain| Arc::new(chain.to_vec()));
        Self {
            stream: Stream::Tls(Box::new(stream)),
            peer_certificates,
            _tracked: tracked,
        }
    }
}

impl Connected for ServerIo {
    type ConnectInfo = ServerConnectInfo;

    fn connect_info(&self) -> Self::ConnectInfo {
        let tcp = match &self.stream {
            Stream::Plain(tcp) => tcp.connect_info(),
            Stream::Tls(tls) => tls.get_ref().0.connect_info(),
        };
        ServerConnectInfo {
            tcp,
            peer_certificates: self.peer_certificates.clone(),
        }
    }
}

impl AsyncRead for ServerIo {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().stream {
            Stream::Plain(tcp) => Pin::new(tcp).poll_read(cx, buf),
            Stream::Tls(tls) => Pin::new(tls.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for ServerIo {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        match &mut self.get_mut().stream {
            Stream::Plain(tcp) => Pin::new(tcp).poll_write(cx, buf),
            Stream::Tls(tls) => Pin::new(tls.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().stream {
            Stream::Plain(tcp) => Pin::new(tcp).poll_flush(cx),
            Stream::Tls(tls) => Pin::new(tls.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().stream {
            Stream::Plain(tcp) => Pin::new(tcp).poll_shutdown(cx),
            Stream::Tls(tls) => Pin::new(tls.as_mut()).poll_shutdown(cx),
        }
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        match &mut self.get_mut().stream {
            Stream::Plain(tcp) => Pin::new(tcp).poll_write_vectored(cx, bufs),
            Stream::Tls(tls) => Pin::new(tls.as_mut()).poll_write_vectored(cx, bufs),
        }
    }

    fn is_write_vectored(&self) -> bool {
        match &self.stream {
            Stream::Plain(tcp) => tcp.is_write_vectored(),
            Stream::Tls(tls) => tls.is_write_vectored(),
        }
    }
}

/// Accept loop for one binding.
///
/// Runs until shutdown is requested or tonic stops consuming connections.
/// TLS handshakes run off the loop so a slow client cannot stall accepts.
pub(crate) async fn accept_loop(
    listener: TcpListener,
    tls: Option<TlsAcceptor>,
    connections: Connections,
    tx: mpsc::Sender<io::Result<ServerIo>>,
    shutdown: watch::Receiver<bool>,
    handshake_timeout: Duration,
) {
    let mut handshakes = JoinSet::new();
    let stop = shutdown_requested(shutdown);
    tokio::pin!(stop);

    loop {
        tokio::select! {
            _ = &mut stop => break,
            Some(_) = handshakes.join_next(), if !handshakes.is_empty() => {}
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        warn!(target: "grpc_server", error = %err, "failed to accept connection");
                        continue;
                    }
                };

                let (stream, tracked) = match connections.track(stream) {
                    Ok(tracked) => tracked,
                    Err(err) => {
                        warn!(target: "grpc_server", %peer, error = %err, "failed to register connection");
                        continue;
                    }
                };

                let Some(acceptor) = tls.clone() else {
                    // a full backlog must not hide the shutdown signal
                    tokio::select! {
                        _ = &mut stop => break,
                        sent = tx.send(Ok(ServerIo::plain(stream, tracked))) => {
                            if sent.is_err() {
                                break;
                            }
                        }
                    }
                    continue;
                };

                let tx = tx.clone();
                handshakes.spawn(async move {
                    match tokio::time::timeout(handshake_timeout, acceptor.accept(stream)).await {
                        Ok(Ok(tls)) => {
                            let _ = tx.send(Ok(ServerIo::tls(tls, tracked))).await;
                        }
                        Ok(Err(err)) => {
                            debug!(target: "grpc_server", %peer, error = %err, "TLS handshake failed");
                        }
                        Err(_) => {
                            debug!(target: "grpc_server", %peer, ?handshake_timeout, "TLS handshake timed out");
                        }
                    }
                });
            }
        }
    }
}

/// Resolves once shutdown is requested or the server is gone.
pub(crate) async fn shutdown_requested(mut shutdown: watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_abort_all_closes_tracked_sockets() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mut client = TcpStream::connect(addr).await.unwrap();
        let (server_side, _) = listener.accept().await.unwrap();

        let connections = Connections::default();
        let (_server_side, tracked) = connections.track(server_side).unwrap();
        assert_eq!(connections.len(), 1);

        assert_eq!(connections.abort_all(), 1);
        let mut buf = [0_u8; 8];
        let read = client.read(&mut buf).await;
        assert!(matches!(read, Ok(0) | Err(_)));

        drop(tracked);
        assert_eq!(connections.len(), 0);
    }

    #[tokio::test]
    async fn test_dropping_connection_unregisters_it() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _client = TcpStream::connect(addr).await.unwrap();
        let (server_side, _) = listener.accept().await.unwrap();

        let connections = Connections::default();
        let (stream, tracked) = connections.track(server_side).unwrap();
        let io = ServerIo::plain(stream, tracked);
        let info = io.connect_info();
        assert_eq!(info.local_addr(), Some(addr));
        assert!(info.remote_addr().is_some());
        assert!(info.peer_certificates().is_none());

        drop(io);
        assert_eq!(connections.len(), 0);
    }

    #[tokio::test]
    async fn test_accept_loop_stops_while_backlog_is_full() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Connections::default();
        let (tx, mut rx) = mpsc::channel(1);
        let (stop, shutdown) = watch::channel(false);

        let accepting = tokio::spawn(accept_loop(
            listener,
            None,
            connections.clone(),
            tx,
            shutdown,
            Duration::from_secs(1),
        ));

        // the first fills the backlog, the second parks the loop on send
        let _first = TcpStream::connect(addr).await.unwrap();
        let _second = TcpStream::connect(addr).await.unwrap();
        while connections.len() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        stop.send_replace(true);
        tokio::time::timeout(Duration::from_secs(5), accepting)
            .await
            .expect("accept loop ignored shutdown")
            .unwrap();

        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
        assert_eq!(connections.len(), 0);
    }
}
