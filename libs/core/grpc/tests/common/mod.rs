//! Helpers shared by the integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use grpc_credentials::server::{GrpcServer, HealthHook, ServerConfig, create_health_service};
use grpc_credentials::KeyCertPair;
use rcgen::{BasicConstraints, Certificate, CertificateParams, DnType, IsCa, KeyPair};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName};
use rustls::{ClientConfig, RootCertStore};
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tonic::service::Routes;
use tonic::transport::{Channel, Endpoint};
use tonic_health::pb::health_client::HealthClient;

pub const SERVICE: &str = "test.Service";

/// A server exposing only the health service, reporting for [`SERVICE`].
pub fn health_server() -> GrpcServer {
    let (reporter, health_service) = create_health_service();
    GrpcServer::new(ServerConfig::default(), Routes::new(health_service))
        .with_health(HealthHook::new(reporter, [SERVICE]))
}

pub async fn channel(addr: SocketAddr) -> Channel {
    Endpoint::from_shared(format!("http://{addr}"))
        .unwrap()
        .connect()
        .await
        .unwrap()
}

pub async fn health_client(addr: SocketAddr) -> HealthClient<Channel> {
    HealthClient::new(channel(addr).await)
}

pub struct Issued {
    pub cert: Certificate,
    pub key: KeyPair,
}

impl Issued {
    pub fn key_cert_pair(&self) -> KeyCertPair {
        KeyCertPair::new(self.key.serialize_pem().into_bytes(), self.cert.pem().into_bytes())
    }

    pub fn der(&self) -> (CertificateDer<'static>, PrivateKeyDer<'static>) {
        (
            self.cert.der().clone(),
            PrivatePkcs8KeyDer::from(self.key.serialize_der()).into(),
        )
    }
}

/// A throwaway CA with a server certificate for `localhost` and a client
/// certificate, both issued by it.
pub struct Pki {
    pub ca: Issued,
    pub server: Issued,
    pub client: Issued,
}

impl Pki {
    pub fn generate() -> Self {
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.distinguished_name.push(DnType::CommonName, "grpc-credentials test CA");
        let ca_key = KeyPair::generate().unwrap();
        let ca_cert = params.self_signed(&ca_key).unwrap();

        let issue = |name: &str| {
            let key = KeyPair::generate().unwrap();
            let cert = CertificateParams::new(vec![name.to_string()])
                .unwrap()
                .signed_by(&key, &ca_cert, &ca_key)
                .unwrap();
            Issued { cert, key }
        };
        let server = issue("localhost");
        let client = issue("client");

        Self {
            ca: Issued { cert: ca_cert, key: ca_key },
            server,
            client,
        }
    }

    pub fn ca_pem(&self) -> bytes::Bytes {
        bytes::Bytes::from(self.ca.cert.pem())
    }

    /// Client config trusting the CA, presenting `identity` when given.
    pub fn client_config(&self, identity: Option<&Issued>) -> ClientConfig {
        let mut roots = RootCertStore::empty();
        roots.add(self.ca.cert.der().clone()).unwrap();

        let builder = ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_root_certificates(roots);

        let mut config = match identity {
            Some(issued) => {
                let (cert, key) = issued.der();
                builder.with_client_auth_cert(vec![cert], key).unwrap()
            }
            None => builder.with_no_client_auth(),
        };
        config.alpn_protocols = vec![b"h2".to_vec()];
        config
    }
}

pub async fn tls_connect(
    addr: SocketAddr,
    config: ClientConfig,
) -> std::io::Result<TlsStream<TcpStream>> {
    let tcp = TcpStream::connect(addr).await?;
    let name = ServerName::try_from("localhost").unwrap();
    TlsConnector::from(Arc::new(config)).connect(name, tcp).await
}

/// A channel speaking gRPC over TLS to `addr`, verifying it as `localhost`.
pub async fn tls_channel(addr: SocketAddr, config: ClientConfig) -> Channel {
    let connector = TlsConnector::from(Arc::new(config));
    Endpoint::from_static("http://localhost")
        .connect_with_connector(tower::service_fn(move |_: http::Uri| {
            let connector = connector.clone();
            async move {
                let tcp = TcpStream::connect(addr).await?;
                let name = ServerName::try_from("localhost").unwrap();
                let tls = connector.connect(name, tcp).await?;
                Ok::<_, std::io::Error>(TokioIo::new(tls))
            }
        }))
        .await
        .unwrap()
}
