use bytes::Bytes;

use super::raw::RawValue;
use super::{KeyCertPair, RootCerts, ServerCredentials, SslSettings};
use crate::error::{CredentialsError, CredentialsResult};

/// Plaintext credentials. Takes no input and never fails.
pub fn create_insecure() -> ServerCredentials {
    ServerCredentials::Insecure
}

/// Validate raw TLS material and produce secure credentials.
///
/// `check_client_certificate` of `None` means the argument was not supplied
/// and defaults to `false`. Checks run in a fixed order and stop at the first
/// violation:
///
/// 1. `root_certs` is null or bytes
/// 2. `key_cert_pairs` is a list
/// 3. every element is a map holding `privateKey` and `certChain` bytes,
///    checked element by element
/// 4. `check_client_certificate`, when supplied, is a bool
pub fn create_ssl(
    root_certs: impl Into<RawValue>,
    key_cert_pairs: impl Into<RawValue>,
    check_client_certificate: Option<RawValue>,
) -> CredentialsResult<ServerCredentials> {
    let mut builder = ServerCredentialsBuilder::new(root_certs).key_cert_pairs(key_cert_pairs);
    if let Some(check) = check_client_certificate {
        builder = builder.check_client_certificate(check);
    }
    builder.build()
}

/// Staged builder for secure credentials.
///
/// Collects raw input; nothing is inspected until [`build`](Self::build),
/// which either returns a complete descriptor or the first validation error.
#[derive(Debug, Clone)]
pub struct ServerCredentialsBuilder {
    root_certs: RawValue,
    key_cert_pairs: RawValue,
    check_client_certificate: Option<RawValue>,
}

impl ServerCredentialsBuilder {
    pub fn new(root_certs: impl Into<RawValue>) -> Self {
        Self {
            root_certs: root_certs.into(),
            key_cert_pairs: RawValue::List(Vec::new()),
            check_client_certificate: None,
        }
    }

    pub fn key_cert_pairs(mut self, pairs: impl Into<RawValue>) -> Self {
        self.key_cert_pairs = pairs.into();
        self
    }

    pub fn key_cert_pair(mut self, pair: KeyCertPair) -> Self {
        match &mut self.key_cert_pairs {
            RawValue::List(items) => items.push(pair.into()),
            other => *other = RawValue::List(vec![pair.into()]),
        }
        self
    }

    pub fn check_client_certificate(mut self, check: impl Into<RawValue>) -> Self {
        self.check_client_certificate = Some(check.into());
        self
    }

    pub fn build(self) -> CredentialsResult<ServerCredentials> {
        let ca = root_certs(self.root_certs)?;
        let pairs = key_cert_pairs(self.key_cert_pairs)?;
        let request_cert = match self.check_client_certificate {
            None => false,
            Some(RawValue::Bool(check)) => check,
            Some(other) => {
                tracing::debug!(
                    target: "grpc_credentials",
                    kind = other.kind(),
                    "rejected checkClientCertificate"
                );
                return Err(CredentialsError::invalid(
                    "checkClientCertificate must be a boolean",
                ));
            }
        };

        tracing::debug!(
            target: "grpc_credentials",
            pairs = pairs.len(),
            custom_ca = matches!(ca, RootCerts::Custom(_)),
            request_cert,
            "secure server credentials created"
        );

        Ok(ServerCredentials::Secure(SslSettings::from_pairs(
            ca,
            pairs,
            request_cert,
        )))
    }
}

fn root_certs(value: RawValue) -> CredentialsResult<RootCerts> {
    match value {
        RawValue::Null => Ok(RootCerts::SystemDefault),
        RawValue::Bytes(bundle) => Ok(RootCerts::Custom(bundle)),
        _ => Err(CredentialsError::invalid(
            "rootCerts must be null or a Buffer",
        )),
    }
}

fn key_cert_pairs(value: RawValue) -> CredentialsResult<Vec<KeyCertPair>> {
    let RawValue::List(items) = value else {
        return Err(CredentialsError::invalid("keyCertPairs must be an array"));
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| key_cert_pair(index, item))
        .collect()
}

fn key_cert_pair(index: usize, value: RawValue) -> CredentialsResult<KeyCertPair> {
    let RawValue::Map(mut fields) = value else {
        return Err(CredentialsError::invalid(format!(
            "keyCertPair[{index}] must be an object"
        )));
    };

    let private_key = take_bytes(&mut fields, "privateKey").ok_or_else(|| {
        CredentialsError::invalid(format!("keyCertPair[{index}].privateKey must be a Buffer"))
    })?;
    let cert_chain = take_bytes(&mut fields, "certChain").ok_or_else(|| {
        CredentialsError::invalid(format!("keyCertPair[{index}].certChain must be a Buffer"))
    })?;

    Ok(KeyCertPair {
        private_key,
        cert_chain,
    })
}

fn take_bytes(
    fields: &mut std::collections::BTreeMap<String, RawValue>,
    name: &str,
) -> Option<Bytes> {
    match fields.remove(name) {
        Some(RawValue::Bytes(bytes)) => Some(bytes),
        _ => None,
    }
}
