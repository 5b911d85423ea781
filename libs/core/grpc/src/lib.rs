//! # gRPC Credentials Library
//!
//! Transport security and per-call credentials for tonic servers and clients.
//!
//! ## Features
//!
//! - **Server credentials**: validated, immutable descriptors for plaintext or
//!   TLS listeners, optionally requiring client certificates
//! - **Server lifecycle**: bind any number of addresses, start, then shut down
//!   gracefully or by force, with health status following along
//! - **Call credentials**: async metadata generators, combined so that several
//!   run concurrently for every call, attached to a channel as a tower layer
//!
//! ## Quick Start
//!
//! ### Serving over TLS
//! ```ignore
//! use grpc_credentials::{create_ssl, KeyCertPair};
//! use grpc_credentials::server::{GrpcServer, ServerConfig, shutdown_signal};
//!
//! let credentials = create_ssl(None::<bytes::Bytes>, vec![KeyCertPair::new(key_pem, cert_pem)], None)?;
//!
//! let mut server = GrpcServer::new(ServerConfig::default(), routes);
//! let port = server.bind("0.0.0.0:50051", credentials).await?;
//! server.serve_until(shutdown_signal()).await?;
//! ```
//!
//! ### Calling with credentials
//! ```ignore
//! use grpc_credentials::call_credentials::{combine, from_metadata_generator, with_call_credentials, Metadata, StaticToken};
//!
//! let creds = combine([
//!     StaticToken::bearer("my-token").into_credentials(),
//!     from_metadata_generator(|url| async move { fetch_metadata(url).await }),
//! ]);
//! let channel = with_call_credentials(channel, origin, creds);
//! ```

pub mod call_credentials;
pub mod credentials;
pub mod error;
pub mod server;
pub mod telemetry;
pub mod tls;

// Re-export main types and functions for convenience
pub use call_credentials::{
    CallCredentials, CallCredentialsExt, Metadata, MetadataValue, combine, from_metadata_generator,
    with_call_credentials,
};
pub use credentials::{
    KeyCertPair, RawValue, RootCerts, ServerCredentials, ServerCredentialsBuilder, SslSettings,
    create_insecure, create_ssl,
};
pub use error::{
    CallCredentialsError, ConfigError, CredentialsError, CredentialsResult, ServerError, ServerResult,
    TlsError,
};
pub use server::{GrpcServer, ServerConfig, ServerConnectInfo, ServerState};
