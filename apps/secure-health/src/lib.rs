//! SecureHealth gRPC Service
//!
//! Serves `grpc.health.v1.Health` over plaintext or TLS, configured entirely
//! from the environment. It exists to run the credentials and lifecycle
//! layer end to end, e.g. as a TLS probe target in a cluster.
//!
//! ## Architecture
//!
//! ```text
//! Client (grpc_health_probe / grpcurl)
//!   ↓ (gRPC, optionally TLS / mTLS)
//! GrpcServer (grpc-credentials)
//!   ↓
//! HealthServer (tonic-health)
//! ```
//!
//! ## Modules
//!
//! - `server`: Server initialization and lifecycle

pub mod server;

// Re-export for convenience
pub use server::{health_routes, run};
