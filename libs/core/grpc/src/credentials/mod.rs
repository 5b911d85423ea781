//! Server credential descriptors.
//!
//! A [`ServerCredentials`] value describes how a listening address secures
//! its connections. It is either plaintext or carries [`SslSettings`] that are
//! handed, unchanged, to the TLS engine when the address is bound.
//!
//! Descriptors are only produced by constructors that validate their input,
//! and expose no way to mutate them afterwards. Cloning is cheap: certificate
//! material is held in reference counted [`Bytes`].
//!
//! ```ignore
//! use grpc_credentials::credentials::{create_insecure, create_ssl, KeyCertPair};
//!
//! let plaintext = create_insecure();
//! let secure = create_ssl(
//!     Some(ca_pem),
//!     vec![KeyCertPair::new(key_pem, cert_pem)],
//!     Some(true.into()),
//! )?;
//! ```

mod builder;
mod raw;

pub use builder::{ServerCredentialsBuilder, create_insecure, create_ssl};
pub use raw::RawValue;

use bytes::Bytes;

/// Trust anchors used to verify client certificates.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RootCerts {
    /// Use the platform trust store.
    #[default]
    SystemDefault,
    /// PEM encoded certificate bundle supplied by the caller.
    Custom(Bytes),
}

impl RootCerts {
    pub fn as_custom(&self) -> Option<&Bytes> {
        match self {
            RootCerts::SystemDefault => None,
            RootCerts::Custom(bundle) => Some(bundle),
        }
    }
}

impl From<Option<Bytes>> for RootCerts {
    fn from(bundle: Option<Bytes>) -> Self {
        bundle.map_or(RootCerts::SystemDefault, RootCerts::Custom)
    }
}

/// A private key and the certificate chain that goes with it, both PEM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCertPair {
    pub private_key: Bytes,
    pub cert_chain: Bytes,
}

impl KeyCertPair {
    pub fn new(private_key: impl Into<Bytes>, cert_chain: impl Into<Bytes>) -> Self {
        Self {
            private_key: private_key.into(),
            cert_chain: cert_chain.into(),
        }
    }
}

/// TLS settings of a secure descriptor.
///
/// `cert[i]` and `key[i]` always belong to the same pair; both sequences have
/// the same length and keep the order the pairs were supplied in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SslSettings {
    ca: RootCerts,
    cert: Vec<Bytes>,
    key: Vec<Bytes>,
    request_cert: bool,
}

impl SslSettings {
    fn from_pairs(ca: RootCerts, pairs: Vec<KeyCertPair>, request_cert: bool) -> Self {
        let (key, cert) = pairs
            .into_iter()
            .map(|pair| (pair.private_key, pair.cert_chain))
            .unzip();
        Self {
            ca,
            cert,
            key,
            request_cert,
        }
    }

    pub fn ca(&self) -> &RootCerts {
        &self.ca
    }

    pub fn cert(&self) -> &[Bytes] {
        &self.cert
    }

    pub fn key(&self) -> &[Bytes] {
        &self.key
    }

    /// Whether clients are asked for, and required to present, a certificate.
    pub fn request_cert(&self) -> bool {
        self.request_cert
    }

    /// Iterate over `(private_key, cert_chain)` in supplied order.
    pub fn pairs(&self) -> impl Iterator<Item = (&Bytes, &Bytes)> {
        self.key.iter().zip(self.cert.iter())
    }
}

/// Immutable description of how a server secures (or does not secure) the
/// connections it accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerCredentials {
    Insecure,
    Secure(SslSettings),
}

impl ServerCredentials {
    /// Typed constructor. All shape checks are enforced by the types, so it
    /// cannot fail.
    pub fn ssl(
        root_certs: RootCerts,
        key_cert_pairs: impl IntoIterator<Item = KeyCertPair>,
        check_client_certificate: bool,
    ) -> Self {
        ServerCredentials::Secure(SslSettings::from_pairs(
            root_certs,
            key_cert_pairs.into_iter().collect(),
            check_client_certificate,
        ))
    }

    pub fn is_secure(&self) -> bool {
        matches!(self, ServerCredentials::Secure(_))
    }

    /// TLS settings, present only for secure credentials.
    pub fn settings(&self) -> Option<&SslSettings> {
        match self {
            ServerCredentials::Insecure => None,
            ServerCredentials::Secure(settings) => Some(settings),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insecure_has_no_settings() {
        let creds = ServerCredentials::Insecure;
        assert!(!creds.is_secure());
        assert!(creds.settings().is_none());
    }

    #[test]
    fn test_typed_ssl_keeps_pairs_aligned() {
        let creds = ServerCredentials::ssl(
            RootCerts::Custom(Bytes::from_static(b"ca")),
            vec![
                KeyCertPair::new(&b"key-a"[..], &b"cert-a"[..]),
                KeyCertPair::new(&b"key-b"[..], &b"cert-b"[..]),
            ],
            true,
        );

        let settings = creds.settings().unwrap();
        assert_eq!(settings.cert(), &[Bytes::from_static(b"cert-a"), Bytes::from_static(b"cert-b")]);
        assert_eq!(settings.key(), &[Bytes::from_static(b"key-a"), Bytes::from_static(b"key-b")]);
        assert!(settings.request_cert());

        let pairs: Vec<_> = settings.pairs().collect();
        assert_eq!(pairs[1], (&Bytes::from_static(b"key-b"), &Bytes::from_static(b"cert-b")));
    }

    #[test]
    fn test_root_certs_from_option() {
        assert_eq!(RootCerts::from(None), RootCerts::SystemDefault);
        let bundle = Bytes::from_static(b"pem");
        assert_eq!(RootCerts::from(Some(bundle.clone())), RootCerts::Custom(bundle.clone()));
        assert_eq!(RootCerts::Custom(bundle.clone()).as_custom(), Some(&bundle));
    }
}
