use std::sync::Arc;

use async_trait::async_trait;

use super::{CallCredentials, Metadata};
use crate::error::CallCredentialsError;

/// Call credentials carrying a fixed authentication header
///
/// Supports Bearer tokens, API keys, and custom authorization header values.
///
/// # Example
/// ```ignore
/// use grpc_credentials::call_credentials::StaticToken;
///
/// let auth = StaticToken::bearer("my-jwt-token").into_credentials();
/// let channel = with_call_credentials(channel, origin, auth);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StaticToken {
    header: &'static str,
    value: String,
}

impl StaticToken {
    /// Bearer token (OAuth 2.0 / JWT) in the `authorization` header
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            header: "authorization",
            value: format!("Bearer {}", token.into()),
        }
    }

    /// Verbatim `authorization` header value
    ///
    /// # Example
    /// ```ignore
    /// let auth = StaticToken::custom("Basic dXNlcjpwYXNz");
    /// ```
    pub fn custom(value: impl Into<String>) -> Self {
        Self {
            header: "authorization",
            value: value.into(),
        }
    }

    /// API key in the `x-api-key` header
    pub fn api_key(key: impl Into<String>) -> Self {
        Self {
            header: "x-api-key",
            value: key.into(),
        }
    }

    pub fn into_credentials(self) -> Arc<dyn CallCredentials> {
        Arc::new(self)
    }
}

#[async_trait]
impl CallCredentials for StaticToken {
    async fn generate_metadata(&self, _service_url: &str) -> Result<Metadata, CallCredentialsError> {
        Ok(Metadata::new().with(self.header, self.value.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call_credentials::MetadataValue;

    #[tokio::test]
    async fn test_bearer_token() {
        let metadata = StaticToken::bearer("test-token").generate_metadata("svc").await.unwrap();
        assert_eq!(
            metadata.get("authorization").unwrap(),
            &[MetadataValue::from("Bearer test-token")]
        );
    }

    #[tokio::test]
    async fn test_api_key() {
        let metadata = StaticToken::api_key("my-key").generate_metadata("svc").await.unwrap();
        assert_eq!(metadata.get("x-api-key").unwrap(), &[MetadataValue::from("my-key")]);
        assert!(metadata.get("authorization").is_none());
    }

    #[tokio::test]
    async fn test_custom() {
        let metadata = StaticToken::custom("Basic xyz123").generate_metadata("svc").await.unwrap();
        assert_eq!(
            metadata.get("authorization").unwrap(),
            &[MetadataValue::from("Basic xyz123")]
        );
    }
}
