use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use http::Uri;
use tower::{BoxError, Layer, Service};

use super::CallCredentials;

/// Attach call credentials to a channel.
///
/// `origin` is the target the channel connects to; it supplies scheme and
/// authority for the service URL handed to the providers.
///
/// # Example
/// ```ignore
/// let channel = Endpoint::from_static("https://api.example.com").connect().await?;
/// let channel = with_call_credentials(channel, "https://api.example.com".parse()?, creds);
/// let client = TasksServiceClient::new(channel);
/// ```
pub fn with_call_credentials<S>(
    inner: S,
    origin: Uri,
    credentials: Arc<dyn CallCredentials>,
) -> CallCredentialsService<S> {
    CallCredentialsLayer::new(origin, credentials).layer(inner)
}

/// Service URL for a request path: `scheme://authority/package.Service`.
///
/// Scheme and authority come from the request URI when it carries them, from
/// `origin` otherwise. The default HTTPS port is dropped.
pub fn service_url(origin: &Uri, request: &Uri) -> String {
    let scheme = request
        .scheme_str()
        .or_else(|| origin.scheme_str())
        .unwrap_or("https");
    let authority = request.authority().or_else(|| origin.authority());
    let host = match authority {
        Some(authority) if scheme == "https" && authority.port_u16() == Some(443) => authority.host(),
        Some(authority) => authority.as_str(),
        None => "",
    };

    let path = request.path();
    let service = path.rsplit_once('/').map_or(path, |(service, _method)| service);

    format!("{scheme}://{host}{service}")
}

/// Tower layer running call credentials before every call.
#[derive(Clone)]
pub struct CallCredentialsLayer {
    origin: Uri,
    credentials: Arc<dyn CallCredentials>,
}

impl CallCredentialsLayer {
    pub fn new(origin: Uri, credentials: Arc<dyn CallCredentials>) -> Self {
        Self {
            origin,
            credentials,
        }
    }
}

impl<S> Layer<S> for CallCredentialsLayer {
    type Service = CallCredentialsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CallCredentialsService {
            inner,
            origin: self.origin.clone(),
            credentials: Arc::clone(&self.credentials),
        }
    }
}

/// Service produced by [`CallCredentialsLayer`].
///
/// Provider failures end the call with `UNAVAILABLE` before anything is sent;
/// other calls on the same channel are not affected.
#[derive(Clone)]
pub struct CallCredentialsService<S> {
    inner: S,
    origin: Uri,
    credentials: Arc<dyn CallCredentials>,
}

impl<S, B> Service<http::Request<B>> for CallCredentialsService<S>
where
    S: Service<http::Request<B>> + Clone + Send + 'static,
    S::Response: Send + 'static,
    S::Error: Into<BoxError>,
    S::Future: Send + 'static,
    B: Send + 'static,
{
    type Response = S::Response;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, mut request: http::Request<B>) -> Self::Future {
        // the instance polled ready is the one that must serve the call
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let credentials = Arc::clone(&self.credentials);
        let url = service_url(&self.origin, request.uri());

        Box::pin(async move {
            let metadata = credentials
                .generate_metadata(&url)
                .await
                .map_err(|err| Box::new(tonic::Status::from(err)) as BoxError)?;

            metadata.append_to_headers(request.headers_mut()).map_err(|err| {
                tracing::warn!(target: "grpc_credentials", service_url = %url, error = %err, "dropping call");
                Box::new(tonic::Status::from(err)) as BoxError
            })?;

            tracing::trace!(
                target: "grpc_credentials",
                service_url = %url,
                keys = metadata.len(),
                "call credentials attached"
            );

            inner.call(request).await.map_err(Into::into)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call_credentials::{Metadata, StaticToken, from_metadata_generator};
    use std::convert::Infallible;

    fn uri(s: &'static str) -> Uri {
        Uri::from_static(s)
    }

    #[test]
    fn test_service_url_from_origin() {
        let url = service_url(&uri("http://127.0.0.1:50051"), &uri("/grpc.health.v1.Health/Check"));
        assert_eq!(url, "http://127.0.0.1:50051/grpc.health.v1.Health");
    }

    #[test]
    fn test_service_url_drops_default_https_port() {
        let url = service_url(&uri("https://api.example.com:443"), &uri("/pkg.Tasks/List"));
        assert_eq!(url, "https://api.example.com/pkg.Tasks");
    }

    #[test]
    fn test_service_url_prefers_request_authority() {
        let url = service_url(
            &uri("http://origin:1"),
            &uri("https://other.example.com/pkg.Tasks/List"),
        );
        assert_eq!(url, "https://other.example.com/pkg.Tasks");
    }

    #[derive(Clone)]
    struct Echo;

    impl Service<http::Request<()>> for Echo {
        type Response = http::HeaderMap;
        type Error = Infallible;
        type Future = std::future::Ready<Result<http::HeaderMap, Infallible>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Infallible>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, request: http::Request<()>) -> Self::Future {
            std::future::ready(Ok(request.headers().clone()))
        }
    }

    fn request() -> http::Request<()> {
        http::Request::builder()
            .uri("/pkg.Tasks/List")
            .body(())
            .unwrap()
    }

    #[tokio::test]
    async fn test_metadata_attached_to_request() {
        let creds = StaticToken::bearer("t").into_credentials();
        let mut svc = with_call_credentials(Echo, uri("http://localhost:1"), creds);

        let headers = svc.call(request()).await.unwrap();
        assert_eq!(headers.get("authorization").unwrap(), "Bearer t");
    }

    #[tokio::test]
    async fn test_generator_failure_fails_call_with_unavailable() {
        let creds = from_metadata_generator(|_| async { Err::<Metadata, _>("no token") });
        let mut svc = with_call_credentials(Echo, uri("http://localhost:1"), creds);

        let err = svc.call(request()).await.unwrap_err();
        let status = err.downcast::<tonic::Status>().unwrap();
        assert_eq!(status.code(), tonic::Code::Unavailable);
        assert!(status.message().contains("no token"));
    }

    #[tokio::test]
    async fn test_invalid_metadata_fails_call() {
        let creds = from_metadata_generator(|_| async {
            Ok::<_, String>(Metadata::new().with("bad key", "v"))
        });
        let mut svc = with_call_credentials(Echo, uri("http://localhost:1"), creds);

        let err = svc.call(request()).await.unwrap_err();
        let status = err.downcast::<tonic::Status>().unwrap();
        assert_eq!(status.code(), tonic::Code::Internal);
    }
}
