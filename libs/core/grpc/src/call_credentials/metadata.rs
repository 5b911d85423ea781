use bytes::Bytes;
use tonic::metadata::{
    AsciiMetadataKey, AsciiMetadataValue, BinaryMetadataKey, BinaryMetadataValue, MetadataMap,
};

use crate::error::CallCredentialsError;

/// One metadata value. Binary values may only be stored under keys ending in
/// `-bin`, text values only under keys that do not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataValue {
    Text(String),
    Binary(Bytes),
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_owned())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Text(value)
    }
}

impl From<Bytes> for MetadataValue {
    fn from(value: Bytes) -> Self {
        MetadataValue::Binary(value)
    }
}

impl From<Vec<u8>> for MetadataValue {
    fn from(value: Vec<u8>) -> Self {
        MetadataValue::Binary(Bytes::from(value))
    }
}

/// Ordered multi-map of call metadata.
///
/// Keys are stored lower-case. A key keeps the position of its first
/// insertion; further values for it are appended to its list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Metadata {
    entries: Vec<(String, Vec<MetadataValue>)>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value under `key`.
    pub fn insert(&mut self, key: impl AsRef<str>, value: impl Into<MetadataValue>) -> &mut Self {
        let key = key.as_ref().to_ascii_lowercase();
        let value = value.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, values)) => values.push(value),
            None => self.entries.push((key, vec![value])),
        }
        self
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, key: impl AsRef<str>, value: impl Into<MetadataValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&[MetadataValue]> {
        let key = key.to_ascii_lowercase();
        self.entries
            .iter()
            .find(|(existing, _)| *existing == key)
            .map(|(_, values)| values.as_slice())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[MetadataValue])> {
        self.entries
            .iter()
            .map(|(key, values)| (key.as_str(), values.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append every entry of `other` after the entries already present.
    pub fn merge(&mut self, other: Metadata) {
        for (key, values) in other.entries {
            for value in values {
                self.insert(&key, value);
            }
        }
    }

    /// Append this metadata to outgoing request headers, keeping the values
    /// already present. Nothing is written if any entry is invalid.
    pub fn append_to_headers(&self, headers: &mut http::HeaderMap) -> Result<(), CallCredentialsError> {
        let encoded = self.encode()?;
        let mut map = MetadataMap::from_headers(std::mem::take(headers));
        for entry in encoded {
            match entry {
                Encoded::Ascii(key, value) => {
                    map.append(key, value);
                }
                Encoded::Binary(key, value) => {
                    map.append_bin(key, value);
                }
            }
        }
        *headers = map.into_headers();
        Ok(())
    }

    fn encode(&self) -> Result<Vec<Encoded>, CallCredentialsError> {
        let mut encoded = Vec::new();
        for (key, values) in &self.entries {
            for value in values {
                encoded.push(Encoded::new(key, value)?);
            }
        }
        Ok(encoded)
    }
}

impl<K, V> FromIterator<(K, V)> for Metadata
where
    K: AsRef<str>,
    V: Into<MetadataValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut metadata = Metadata::new();
        for (key, value) in iter {
            metadata.insert(key, value);
        }
        metadata
    }
}

enum Encoded {
    Ascii(AsciiMetadataKey, AsciiMetadataValue),
    Binary(BinaryMetadataKey, BinaryMetadataValue),
}

impl Encoded {
    fn new(key: &str, value: &MetadataValue) -> Result<Self, CallCredentialsError> {
        let invalid = |reason: String| CallCredentialsError::InvalidMetadata {
            key: key.to_owned(),
            reason,
        };

        match value {
            MetadataValue::Text(text) => {
                let key = AsciiMetadataKey::from_bytes(key.as_bytes()).map_err(|e| invalid(e.to_string()))?;
                let value = AsciiMetadataValue::try_from(text.as_str()).map_err(|e| invalid(e.to_string()))?;
                Ok(Encoded::Ascii(key, value))
            }
            MetadataValue::Binary(bytes) => {
                let key = BinaryMetadataKey::from_bytes(key.as_bytes()).map_err(|e| invalid(e.to_string()))?;
                Ok(Encoded::Binary(key, BinaryMetadataValue::from_bytes(bytes)))
            }
        }
    }
}
