use std::collections::BTreeMap;

use bytes::Bytes;

use super::{KeyCertPair, RootCerts};

/// Shape-unchecked credential input.
///
/// Embedding layers (language bindings, parsed configuration documents) hand
/// credential material over before anything is known about its shape. The
/// builder inspects these values and rejects anything that is not the
/// expected kind with a message naming the offending argument.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    Bytes(Bytes),
    List(Vec<RawValue>),
    Map(BTreeMap<String, RawValue>),
}

impl RawValue {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            RawValue::Null => "null",
            RawValue::Bool(_) => "bool",
            RawValue::Number(_) => "number",
            RawValue::Text(_) => "text",
            RawValue::Bytes(_) => "bytes",
            RawValue::List(_) => "list",
            RawValue::Map(_) => "map",
        }
    }

    /// Build a map value from `(key, value)` entries.
    pub fn map<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, RawValue)>,
    {
        RawValue::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl From<bool> for RawValue {
    fn from(value: bool) -> Self {
        RawValue::Bool(value)
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Number(value)
    }
}

impl From<i64> for RawValue {
    fn from(value: i64) -> Self {
        RawValue::Number(value as f64)
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_owned())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        RawValue::Text(value)
    }
}

impl From<Bytes> for RawValue {
    fn from(value: Bytes) -> Self {
        RawValue::Bytes(value)
    }
}

impl From<&'static [u8]> for RawValue {
    fn from(value: &'static [u8]) -> Self {
        RawValue::Bytes(Bytes::from_static(value))
    }
}

impl From<Vec<u8>> for RawValue {
    fn from(value: Vec<u8>) -> Self {
        RawValue::Bytes(Bytes::from(value))
    }
}

impl<T: Into<RawValue>> From<Option<T>> for RawValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(RawValue::Null, Into::into)
    }
}

impl From<Vec<RawValue>> for RawValue {
    fn from(value: Vec<RawValue>) -> Self {
        RawValue::List(value)
    }
}

impl From<Vec<KeyCertPair>> for RawValue {
    fn from(pairs: Vec<KeyCertPair>) -> Self {
        RawValue::List(pairs.into_iter().map(RawValue::from).collect())
    }
}

impl From<KeyCertPair> for RawValue {
    fn from(pair: KeyCertPair) -> Self {
        RawValue::map([
            ("privateKey", RawValue::Bytes(pair.private_key)),
            ("certChain", RawValue::Bytes(pair.cert_chain)),
        ])
    }
}

impl From<RootCerts> for RawValue {
    fn from(roots: RootCerts) -> Self {
        match roots {
            RootCerts::SystemDefault => RawValue::Null,
            RootCerts::Custom(bundle) => RawValue::Bytes(bundle),
        }
    }
}
