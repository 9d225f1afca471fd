//! App-control bundle and its wire encoding.
//!
//! # エンコード
//! - serde_json で決定的なバイト列にする（extras は BTreeMap なのでキー順）
//! - 受信側は同じ codec で decode するので、decode(encode(b)) == b が成り立つ
//! - 壊れたバイト列は `CodecError::Malformed`（プロトコルエラー）

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::ErrorKind;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed bundle: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("bundle is empty")]
    Empty,
}

impl CodecError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Protocol
    }
}

/// A single extra value carried by a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum BundleValue {
    Str(String),
    StrArray(Vec<String>),
    Bytes(Vec<u8>),
}

/// The launch intent of an app-control invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bundle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extras: BTreeMap<String, BundleValue>,
}

impl Bundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: BundleValue) -> Self {
        self.extras.insert(key.into(), value);
        self
    }

    /// Any of operation/mime/uri present ⇒ app-control launch.
    pub fn is_app_control(&self) -> bool {
        self.operation.is_some() || self.mime.is_some() || self.uri.is_some()
    }

    pub fn encode(&self) -> EncodedBundle {
        // Serializing plain strings, vectors and a BTreeMap cannot fail.
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        EncodedBundle(bytes)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.is_empty() {
            return Err(CodecError::Empty);
        }
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Encoded bundle bytes as they travel across the bus.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncodedBundle(Vec<u8>);

impl EncodedBundle {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn decode(&self) -> Result<Bundle, CodecError> {
        Bundle::decode(&self.0)
    }
}

impl fmt::Debug for EncodedBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncodedBundle({} bytes)", self.0.len())
    }
}
