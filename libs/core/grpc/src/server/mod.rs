//! gRPC server lifecycle.
//!
//! A [`GrpcServer`] binds any number of addresses, each with its own
//! [`ServerCredentials`](crate::ServerCredentials), serves the same routes on
//! all of them, and shuts down gracefully or by force.
//!
//! ```text
//! Created --bind--> Bound --start--> Started --try_shutdown--> ShuttingDown --> Stopped
//!                     ^  |                    \--force_shutdown-------------/
//!                     +--+ bind
//! ```

mod config;
mod health;
mod io;
mod lifecycle;

pub use config::{ServerConfig, TlsFiles, credentials_from_env};
pub use health::{HealthHook, create_health_service};
pub use io::{PeerCertificates, ServerConnectInfo};
pub use lifecycle::{Binding, GrpcServer, ServerState, shutdown_signal};
