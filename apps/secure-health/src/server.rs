//! gRPC server initialization and lifecycle management
//!
//! This module handles all server setup:
//! - Tracing initialization
//! - Server and TLS configuration from the environment
//! - Health check service (grpc.health.v1.Health)
//! - Bind, serve, and graceful shutdown on SIGINT/SIGTERM

use eyre::{Result, WrapErr};
use grpc_credentials::server::{
    GrpcServer, HealthHook, ServerConfig, create_health_service, credentials_from_env, shutdown_signal,
};
use grpc_credentials::telemetry::{Environment, init_tracing};
use tonic::codec::CompressionEncoding;
use tonic::service::Routes;
use tonic_health::pb::health_server::SERVICE_NAME;
use tonic_health::server::HealthReporter;
use tracing::info;

/// Install color-eyre with a project-standard configuration.
///
/// Safe to call multiple times.
fn install_color_eyre() {
    let _ = color_eyre::config::HookBuilder::default()
        .display_location_section(true)
        .display_env_section(false)
        .install();
}

/// Health service routes with compression and message limits applied.
pub fn health_routes(config: &ServerConfig) -> (HealthReporter, Routes) {
    let (reporter, health_service) = create_health_service();
    let health_service = health_service
        .accept_compressed(CompressionEncoding::Zstd)
        .send_compressed(CompressionEncoding::Zstd)
        .max_decoding_message_size(config.max_message_size)
        .max_encoding_message_size(config.max_message_size);

    (reporter, Routes::new(health_service))
}

/// Run the gRPC server
///
/// 1. Sets up structured logging (env-aware: JSON for prod, pretty for dev)
/// 2. Loads server configuration and credentials (TLS when `GRPC_TLS_CERT` is set)
/// 3. Binds, starts, and reports SERVING
/// 4. On SIGINT/SIGTERM reports NOT_SERVING and drains, forcing after
///    `GRPC_SHUTDOWN_TIMEOUT_SECS`
///
/// # Errors
///
/// Returns an error if:
/// - Server or TLS configuration is invalid
/// - TLS material cannot be read or is rejected by the TLS engine
/// - Server binding fails
pub async fn run() -> Result<()> {
    install_color_eyre();
    let environment = Environment::from_env();
    init_tracing(&environment);

    let config = ServerConfig::from_env().wrap_err("Failed to load server configuration")?;
    let credentials = credentials_from_env().wrap_err("Failed to load server credentials")?;

    let (reporter, routes) = health_routes(&config);
    let mut server =
        GrpcServer::new(config.clone(), routes).with_health(HealthHook::new(reporter, [SERVICE_NAME]));

    let addr = config.addr_string();
    let secure = credentials.is_secure();
    let port = server
        .bind(&addr, credentials)
        .await
        .wrap_err_with(|| format!("Failed to bind {}", addr))?;
    info!(%addr, port, secure, "SecureHealth listening");

    server
        .serve_until(shutdown_signal())
        .await
        .wrap_err("gRPC server failed")?;

    Ok(())
}
