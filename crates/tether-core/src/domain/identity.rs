//! Application identity resolution.
//!
//! An [`ApplicationIdentity`] can only be obtained through [`ApplicationIdentity::parse`]
//! or [`ApplicationIdentity::resolve`], so every value that keys a lookup has
//! passed the grammar check.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::errors::ErrorKind;

/// Upper bound on identity length, in bytes.
pub const MAX_IDENTITY_LEN: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("application id is empty")]
    Empty,

    #[error("application id is {len} bytes long (max {MAX_IDENTITY_LEN})")]
    TooLong { len: usize },

    #[error("application id must start with an ASCII letter or digit, found {0:?}")]
    InvalidStart(char),

    #[error("application id contains {ch:?} at byte {position}")]
    InvalidCharacter { ch: char, position: usize },

    #[error("application id contains a '..' sequence")]
    ParentReference,

    #[error("launch path has no usable final segment: {0:?}")]
    NoBasename(String),
}

impl IdentityError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Identity
    }
}

/// Validated application identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ApplicationIdentity(String);

impl ApplicationIdentity {
    /// Validate `raw` as-is.
    pub fn parse(raw: &str) -> Result<Self, IdentityError> {
        validate(raw)?;
        Ok(Self(raw.to_owned()))
    }

    /// Resolve raw launch input: a filesystem path contributes its final
    /// segment, anything else is used directly.
    pub fn resolve(raw: &str) -> Result<Self, IdentityError> {
        if raw.is_empty() {
            return Err(IdentityError::Empty);
        }
        if !raw.contains('/') {
            return Self::parse(raw);
        }
        let base = Path::new(raw)
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| IdentityError::NoBasename(raw.to_owned()))?;
        Self::parse(base)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn validate(raw: &str) -> Result<(), IdentityError> {
    let Some(first) = raw.chars().next() else {
        return Err(IdentityError::Empty);
    };
    if raw.len() > MAX_IDENTITY_LEN {
        return Err(IdentityError::TooLong { len: raw.len() });
    }
    if !first.is_ascii_alphanumeric() {
        return Err(IdentityError::InvalidStart(first));
    }
    if let Some((position, ch)) = raw
        .char_indices()
        .find(|&(_, ch)| !(ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_')))
    {
        return Err(IdentityError::InvalidCharacter { ch, position });
    }
    if raw.contains("..") {
        return Err(IdentityError::ParentReference);
    }
    Ok(())
}

impl TryFrom<String> for ApplicationIdentity {
    type Error = IdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate(&value)?;
        Ok(Self(value))
    }
}

impl From<ApplicationIdentity> for String {
    fn from(identity: ApplicationIdentity) -> Self {
        identity.0
    }
}

impl fmt::Display for ApplicationIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
