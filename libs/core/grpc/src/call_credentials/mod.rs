//! Per-call credentials.
//!
//! A [`CallCredentials`] provider produces [`Metadata`] for one outgoing call,
//! given the URL of the service being called. Providers are built from async
//! metadata generators, combined so that several run for the same call, and
//! attached to a channel with [`CallCredentialsLayer`].
//!
//! ```ignore
//! use grpc_credentials::call_credentials::*;
//!
//! let token = StaticToken::bearer("my-token").into_credentials();
//! let tenant = from_metadata_generator(|_url| async {
//!     Ok::<_, std::convert::Infallible>(Metadata::new().with("x-tenant", "acme"))
//! });
//!
//! let creds = combine([token, tenant]);
//! let channel = with_call_credentials(channel, "https://api.example.com".parse()?, creds);
//! let client = TasksServiceClient::new(channel);
//! ```

mod compose;
mod generator;
mod layer;
mod metadata;
mod static_token;

pub use compose::{CallCredentialsExt, ComposedCallCredentials, combine};
pub use generator::{MetadataGenerator, from_metadata_generator};
pub use layer::{CallCredentialsLayer, CallCredentialsService, service_url, with_call_credentials};
pub use metadata::{Metadata, MetadataValue};
pub use static_token::StaticToken;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::CallCredentialsError;

/// Produces metadata for a single outgoing call.
#[async_trait]
pub trait CallCredentials: Send + Sync {
    /// Generate metadata for a call to `service_url`
    /// (`scheme://authority/package.Service`).
    async fn generate_metadata(&self, service_url: &str) -> Result<Metadata, CallCredentialsError>;

    /// The providers this one is composed of, if it is a composite.
    fn components(&self) -> Option<&[Arc<dyn CallCredentials>]> {
        None
    }
}
