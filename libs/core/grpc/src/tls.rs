//! Hands secure credentials to the TLS engine.
//!
//! This module does not parse certificates itself: PEM decoding is done by
//! `rustls-pemfile`, key loading and the handshake by `rustls`. It only maps
//! [`SslSettings`] onto a `rustls::ServerConfig`.

use std::sync::Arc;

use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::{ClientHello, ResolvesServerCert, WebPkiClientVerifier};
use rustls::sign::CertifiedKey;
use rustls::{RootCertStore, ServerConfig};

use crate::credentials::{RootCerts, SslSettings};
use crate::error::TlsError;

const H2: &[u8] = b"h2";

/// Crypto provider used for every server config built here.
pub fn crypto_provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

/// Build a TLS server configuration from secure credential settings.
///
/// Every key/certificate pair becomes one certified key. Clients are only
/// asked for a certificate when `request_cert` is set, in which case they
/// must present one that chains to the configured roots.
pub fn server_config(settings: &SslSettings) -> Result<Arc<ServerConfig>, TlsError> {
    let provider = crypto_provider();

    if settings.key().is_empty() {
        return Err(TlsError::NoKeyCertPairs);
    }

    let keys = settings
        .pairs()
        .enumerate()
        .map(|(index, (key, cert))| certified_key(&provider, index, key, cert))
        .collect::<Result<Vec<_>, _>>()?;

    let builder =
        ServerConfig::builder_with_provider(Arc::clone(&provider)).with_safe_default_protocol_versions()?;

    let builder = if settings.request_cert() {
        let roots = Arc::new(root_store(settings.ca())?);
        let verifier = WebPkiClientVerifier::builder_with_provider(roots, Arc::clone(&provider)).build()?;
        builder.with_client_cert_verifier(verifier)
    } else {
        builder.with_no_client_auth()
    };

    let mut config = builder.with_cert_resolver(Arc::new(KeyCertResolver { keys }));
    config.alpn_protocols = vec![H2.to_vec()];

    Ok(Arc::new(config))
}

fn certified_key(
    provider: &CryptoProvider,
    index: usize,
    key_pem: &[u8],
    cert_pem: &[u8],
) -> Result<Arc<CertifiedKey>, TlsError> {
    let chain = rustls_pemfile::certs(&mut &cert_pem[..]).collect::<Result<Vec<CertificateDer<'static>>, _>>()?;
    if chain.is_empty() {
        return Err(TlsError::EmptyCertChain { index });
    }

    let key: PrivateKeyDer<'static> =
        rustls_pemfile::private_key(&mut &key_pem[..])?.ok_or(TlsError::MissingPrivateKey { index })?;
    let signing_key = provider.key_provider.load_private_key(key)?;

    Ok(Arc::new(CertifiedKey::new(chain, signing_key)))
}

fn root_store(ca: &RootCerts) -> Result<RootCertStore, TlsError> {
    let mut store = RootCertStore::empty();

    match ca {
        RootCerts::Custom(bundle) => {
            let certs = rustls_pemfile::certs(&mut &bundle[..]).collect::<Result<Vec<_>, _>>()?;
            store.add_parsable_certificates(certs);
        }
        RootCerts::SystemDefault => {
            let native = rustls_native_certs::load_native_certs();
            for err in &native.errors {
                tracing::warn!(target: "grpc_server", error = %err, "failed to load a native root certificate");
            }
            let (added, ignored) = store.add_parsable_certificates(native.certs);
            tracing::debug!(target: "grpc_server", added, ignored, "loaded system trust store");
        }
    }

    if store.is_empty() {
        return Err(TlsError::EmptyRootBundle);
    }
    Ok(store)
}

/// Picks the first pair whose key can sign with a scheme the client offers,
/// falling back to the first pair.
#[derive(Debug)]
struct KeyCertResolver {
    keys: Vec<Arc<CertifiedKey>>,
}

impl ResolvesServerCert for KeyCertResolver {
    fn resolve(&self, client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        let offered = client_hello.signature_schemes();
        self.keys
            .iter()
            .find(|key| key.key.choose_scheme(offered).is_some())
            .or_else(|| self.keys.first())
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{KeyCertPair, ServerCredentials};
    use bytes::Bytes;

    fn self_signed() -> KeyCertPair {
        let rcgen::CertifiedKey { cert, key_pair } =
            rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        KeyCertPair::new(key_pair.serialize_pem().into_bytes(), cert.pem().into_bytes())
    }

    fn settings(creds: &ServerCredentials) -> &SslSettings {
        creds.settings().unwrap()
    }

    #[test]
    fn test_server_config_advertises_h2() {
        let creds = ServerCredentials::ssl(RootCerts::SystemDefault, vec![self_signed()], false);
        let config = server_config(settings(&creds)).unwrap();
        assert_eq!(config.alpn_protocols, vec![b"h2".to_vec()]);
    }

    #[test]
    fn test_multiple_pairs_accepted() {
        let creds = ServerCredentials::ssl(RootCerts::SystemDefault, vec![self_signed(), self_signed()], false);
        assert!(server_config(settings(&creds)).is_ok());
    }

    #[test]
    fn test_client_auth_with_custom_ca() {
        let ca = self_signed();
        let creds = ServerCredentials::ssl(RootCerts::Custom(ca.cert_chain), vec![self_signed()], true);
        assert!(server_config(settings(&creds)).is_ok());
    }

    #[test]
    fn test_no_pairs_rejected() {
        let creds = ServerCredentials::ssl(RootCerts::SystemDefault, Vec::new(), false);
        assert!(matches!(server_config(settings(&creds)), Err(TlsError::NoKeyCertPairs)));
    }

    #[test]
    fn test_garbage_cert_chain_rejected() {
        let pair = KeyCertPair::new(self_signed().private_key, Bytes::from_static(b"not pem"));
        let creds = ServerCredentials::ssl(RootCerts::SystemDefault, vec![pair], false);
        assert!(matches!(
            server_config(settings(&creds)),
            Err(TlsError::EmptyCertChain { index: 0 })
        ));
    }

    #[test]
    fn test_missing_private_key_rejected() {
        let good = self_signed();
        let bad = KeyCertPair::new(Bytes::from_static(b""), good.cert_chain.clone());
        let creds = ServerCredentials::ssl(RootCerts::SystemDefault, vec![good, bad], false);
        assert!(matches!(
            server_config(settings(&creds)),
            Err(TlsError::MissingPrivateKey { index: 1 })
        ));
    }

    #[test]
    fn test_empty_custom_ca_rejected_when_client_auth_requested() {
        let creds = ServerCredentials::ssl(
            RootCerts::Custom(Bytes::from_static(b"no certificates here")),
            vec![self_signed()],
            true,
        );
        assert!(matches!(server_config(settings(&creds)), Err(TlsError::EmptyRootBundle)));
    }
}
