use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;

use super::{CallCredentials, Metadata};
use crate::error::CallCredentialsError;

/// Combine several providers into one.
///
/// All providers run concurrently for each call. The call gets metadata only
/// if every provider succeeds; the outputs are merged in the order the
/// providers were given, so values for a key produced by more than one
/// provider appear in that order. Composites passed in are flattened.
///
/// # Example
/// ```ignore
/// let creds = combine([
///     StaticToken::bearer("token").into_credentials(),
///     from_metadata_generator(tenant_metadata),
/// ]);
/// ```
pub fn combine<I>(providers: I) -> Arc<dyn CallCredentials>
where
  I: IntoIterator<Item = Arc<dyn CallCredentials>>,
{
  let mut flattened = Vec::new();
  for provider in providers {
    match provider.components() {
      Some(components) => flattened.extend(components.iter().cloned()),
      None => flattened.push(provider),
    }
  }
  Arc::new(ComposedCallCredentials {
    providers: flattened,
  })
}

/// A provider that runs several providers for the same call
///
/// Built by `combine()`, which hands it out as `Arc<dyn CallCredentials>`.
pub struct ComposedCallCredentials {
  providers: Vec<Arc<dyn CallCredentials>>,
}

#[async_trait]
impl CallCredentials for ComposedCallCredentials {
  async fn generate_metadata(&self, service_url: &str) -> Result<Metadata, CallCredentialsError> {
    let outputs = try_join_all(
      self
        .providers
        .iter()
        .map(|provider| provider.generate_metadata(service_url)),
    )
    .await?;

    let mut merged = Metadata::new();
    for metadata in outputs {
      merged.merge(metadata);
    }
    Ok(merged)
  }

  fn components(&self) -> Option<&[Arc<dyn CallCredentials>]> {
    Some(&self.providers)
  }
}

/// Method-style composition for providers
pub trait CallCredentialsExt {
  /// Combine `self` with `other`; `self` comes first in the merged metadata
  fn compose(self, other: Arc<dyn CallCredentials>) -> Arc<dyn CallCredentials>;
}

impl CallCredentialsExt for Arc<dyn CallCredentials> {
  fn compose(self, other: Arc<dyn CallCredentials>) -> Arc<dyn CallCredentials> {
    combine([self, other])
  }
}
