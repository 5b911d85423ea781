use thiserror::Error;

use crate::server::ServerState;

pub type CredentialsResult<T> = Result<T, CredentialsError>;
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors raised while validating credential construction input
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialsError {
  /// Input has the wrong shape or type. The message names the offending
  /// argument, field and index.
  #[error("{0}")]
  InvalidArgument(String),
}

impl CredentialsError {
  pub(crate) fn invalid(message: impl Into<String>) -> Self {
    Self::InvalidArgument(message.into())
  }
}

/// Errors raised by the secure-channel engine while assembling a TLS
/// configuration from a secure credentials descriptor
#[derive(Error, Debug)]
pub enum TlsError {
  #[error("secure credentials carry no key/certificate pairs")]
  NoKeyCertPairs,

  #[error("keyCertPair[{index}].certChain contains no PEM certificates")]
  EmptyCertChain { index: usize },

  #[error("keyCertPair[{index}].privateKey contains no PEM private key")]
  MissingPrivateKey { index: usize },

  #[error("root certificate bundle contains no usable certificates")]
  EmptyRootBundle,

  #[error("failed to decode PEM material: {0}")]
  Pem(#[from] std::io::Error),

  #[error("TLS engine rejected configuration: {0}")]
  Rustls(#[from] rustls::Error),

  #[error("failed to build client certificate verifier: {0}")]
  Verifier(#[from] rustls::server::VerifierBuilderError),
}

/// Errors raised by the server lifecycle
#[derive(Error, Debug)]
pub enum ServerError {
  /// The transport could not acquire the requested address
  #[error("failed to bind {address}: {source}")]
  Bind {
    address: String,
    #[source]
    source: std::io::Error,
  },

  /// A lifecycle operation was invoked in a state that does not allow it
  #[error("cannot {operation} while server is {state}")]
  IllegalState {
    operation: &'static str,
    state: ServerState,
  },

  /// Secure credentials could not be turned into a TLS configuration
  #[error("invalid TLS material for {address}: {source}")]
  Tls {
    address: String,
    #[source]
    source: TlsError,
  },
}

/// Errors surfaced while producing per-call metadata
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallCredentialsError {
  /// A metadata generator reported a failure
  #[error("Getting metadata from plugin failed with error: {0}")]
  Provider(String),

  /// Generated metadata cannot be carried as HTTP/2 headers
  #[error("invalid metadata {key:?}: {reason}")]
  InvalidMetadata { key: String, reason: String },
}

impl CallCredentialsError {
  pub fn provider(err: impl std::fmt::Display) -> Self {
    Self::Provider(err.to_string())
  }
}

/// Configuration error type
#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("Environment variable '{0}' is required but not set")]
  MissingEnvVar(String),

  #[error("Failed to parse environment variable '{key}': {details}")]
  ParseError { key: String, details: String },

  #[error("Failed to read '{path}': {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },

  #[error(transparent)]
  Credentials(#[from] CredentialsError),
}

impl From<CredentialsError> for tonic::Status {
  fn from(err: CredentialsError) -> Self {
    tonic::Status::invalid_argument(err.to_string())
  }
}

impl From<CallCredentialsError> for tonic::Status {
  fn from(err: CallCredentialsError) -> Self {
    match err {
      CallCredentialsError::Provider(_) => tonic::Status::unavailable(err.to_string()),
      CallCredentialsError::InvalidMetadata { .. } => tonic::Status::internal(err.to_string()),
    }
  }
}

impl From<ServerError> for tonic::Status {
  fn from(err: ServerError) -> Self {
    match err {
      ServerError::IllegalState { .. } => tonic::Status::failed_precondition(err.to_string()),
      ServerError::Bind { .. } => tonic::Status::unavailable(err.to_string()),
      ServerError::Tls { .. } => tonic::Status::invalid_argument(err.to_string()),
    }
  }
}
