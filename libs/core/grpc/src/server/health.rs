//! Health reporting tied to the server lifecycle.

use tonic_health::ServingStatus;
use tonic_health::server::HealthReporter;
use tracing::info;

// Re-export health_reporter for convenience
pub use tonic_health::server::health_reporter as create_health_service;

/// Services whose health status follows the server's state.
///
/// The empty service name is always included; it is what k8s default health
/// checks query.
///
/// # Example
///
/// ```ignore
/// let (reporter, health_service) = create_health_service();
/// let routes = Routes::new(health_service).add_service(tasks);
///
/// let server = GrpcServer::new(config, routes)
///     .with_health(HealthHook::new(reporter, [TASKS_SERVICE]));
/// ```
#[derive(Clone)]
pub struct HealthHook {
    reporter: HealthReporter,
    services: Vec<String>,
}

impl HealthHook {
    pub fn new<I, S>(reporter: HealthReporter, services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut services: Vec<String> = services.into_iter().map(Into::into).collect();
        if !services.iter().any(String::is_empty) {
            services.push(String::new());
        }
        Self { reporter, services }
    }

    pub fn services(&self) -> &[String] {
        &self.services
    }

    pub(crate) async fn set_serving(&mut self) {
        self.set_all(ServingStatus::Serving).await;
        info!(target: "grpc_server", services = ?self.services, "Services marked as serving");
    }

    pub(crate) async fn set_not_serving(&mut self) {
        self.set_all(ServingStatus::NotServing).await;
        info!(target: "grpc_server", services = ?self.services, "Services marked as not serving");
    }

    async fn set_all(&mut self, status: ServingStatus) {
        for service in &self.services {
            self.reporter.set_service_status(service, status).await;
        }
    }
}
