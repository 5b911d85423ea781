use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use super::{CallCredentials, Metadata};
use crate::error::CallCredentialsError;

/// Wrap an async metadata generator as a call credentials provider.
///
/// The generator receives the service URL of the call and is invoked once per
/// call, right before the call's headers are sent.
///
/// # Example
/// ```ignore
/// let creds = from_metadata_generator(|service_url| async move {
///     let token = token_source.fetch(&service_url).await?;
///     Ok::<_, TokenError>(Metadata::new().with("authorization", format!("Bearer {token}")))
/// });
/// ```
pub fn from_metadata_generator<F, Fut, E>(generator: F) -> Arc<dyn CallCredentials>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Metadata, E>> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    Arc::new(MetadataGenerator { generator })
}

pub struct MetadataGenerator<F> {
    generator: F,
}

impl<F> fmt::Debug for MetadataGenerator<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataGenerator").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, Fut, E> CallCredentials for MetadataGenerator<F>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Metadata, E>> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    async fn generate_metadata(&self, service_url: &str) -> Result<Metadata, CallCredentialsError> {
        (self.generator)(service_url.to_owned()).await.map_err(|err| {
            tracing::warn!(
                target: "grpc_credentials",
                service_url = %service_url,
                error = %err,
                "metadata generator failed"
            );
            CallCredentialsError::provider(err)
        })
    }
}
