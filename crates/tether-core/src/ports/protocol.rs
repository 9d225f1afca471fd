//! Wire messages exchanged over the control bus.
//!
//! Every method call is a [`Request`]; every answer is a [`Reply`]. Errors are
//! carried as `Reply::Failed`, never as a transport failure.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::codec::EncodedBundle;
use crate::domain::{ApplicationIdentity, ErrorKind, Failure};

/// A bus name, either unique (`:1.7`) or well-known (`org.tether.Runtime`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BusName(String);

impl BusName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_unique(&self) -> bool {
        self.0.starts_with(':')
    }
}

impl fmt::Display for BusName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Root under which running applications are exported.
pub const RUNNING_ROOT: &str = "/running";

/// An exported object path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectPath(String);

impl ObjectPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// The launch manager object.
    pub fn manager() -> Self {
        Self(RUNNING_ROOT.to_owned())
    }

    /// Stable, identity-derived path of an application's control object.
    ///
    /// Path elements only admit `[A-Za-z0-9]`; everything else (including `_`)
    /// is escaped as `_xx`, so distinct identities never share a path.
    pub fn for_identity(identity: &ApplicationIdentity) -> Self {
        let mut path = String::with_capacity(RUNNING_ROOT.len() + 1 + identity.as_str().len() * 3);
        path.push_str(RUNNING_ROOT);
        path.push('/');
        for byte in identity.as_str().bytes() {
            if byte.is_ascii_alphanumeric() {
                path.push(byte as char);
            } else {
                path.push_str(&format!("_{byte:02x}"));
            }
        }
        Self(path)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Opaque handle to the engine's extension process channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelHandle {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fd: Option<i32>,
}

impl ChannelHandle {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fd: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "PascalCase")]
pub enum Request {
    // launch manager
    Launch {
        app_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        encoded_bundle: Option<EncodedBundle>,
    },
    IsApplicationRunning {
        app_id: String,
    },

    // per-application control object
    Terminate,
    GetExtensionProcessChannel,
    Suspend,
    Resume,
    Hide,
    SetUserAgentString {
        value: String,
    },
    GetEncodedBundle,
    SaveEncodedBundle {
        bundle: EncodedBundle,
    },
    RemoveAllCookies,
}

impl Request {
    pub fn method_name(&self) -> &'static str {
        match self {
            Request::Launch { .. } => "Launch",
            Request::IsApplicationRunning { .. } => "IsApplicationRunning",
            Request::Terminate => "Terminate",
            Request::GetExtensionProcessChannel => "GetExtensionProcessChannel",
            Request::Suspend => "Suspend",
            Request::Resume => "Resume",
            Request::Hide => "Hide",
            Request::SetUserAgentString { .. } => "SetUserAgentString",
            Request::GetEncodedBundle => "GetEncodedBundle",
            Request::SaveEncodedBundle { .. } => "SaveEncodedBundle",
            Request::RemoveAllCookies => "RemoveAllCookies",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reply", content = "value", rename_all = "snake_case")]
pub enum Reply {
    Ack,
    Bool(bool),
    Launched(ObjectPath),
    Channel(ChannelHandle),
    Bundle(Option<EncodedBundle>),
    Failed(Failure),
}

impl Reply {
    pub fn failed(kind: ErrorKind, message: impl Into<String>) -> Self {
        Reply::Failed(Failure::new(kind, message))
    }

    pub fn unknown_method(request: &Request) -> Self {
        Reply::failed(
            ErrorKind::Protocol,
            format!("unknown method {}", request.method_name()),
        )
    }

    pub fn into_ack(self) -> Result<(), Failure> {
        match self {
            Reply::Ack => Ok(()),
            other => Err(other.unexpected("ack")),
        }
    }

    pub fn into_bool(self) -> Result<bool, Failure> {
        match self {
            Reply::Bool(value) => Ok(value),
            other => Err(other.unexpected("bool")),
        }
    }

    pub fn into_path(self) -> Result<ObjectPath, Failure> {
        match self {
            Reply::Launched(path) => Ok(path),
            other => Err(other.unexpected("object path")),
        }
    }

    pub fn into_channel(self) -> Result<ChannelHandle, Failure> {
        match self {
            Reply::Channel(handle) => Ok(handle),
            other => Err(other.unexpected("channel handle")),
        }
    }

    pub fn into_bundle(self) -> Result<Option<EncodedBundle>, Failure> {
        match self {
            Reply::Bundle(bundle) => Ok(bundle),
            other => Err(other.unexpected("bundle")),
        }
    }

    fn unexpected(self, wanted: &str) -> Failure {
        match self {
            Reply::Failed(failure) => failure,
            other => Failure::new(
                ErrorKind::Protocol,
                format!("expected {wanted} reply, got {other:?}"),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_paths_escape_non_alphanumerics() {
        let identity = ApplicationIdentity::parse("exec-id123").unwrap();
        assert_eq!(ObjectPath::for_identity(&identity).as_str(), "/running/exec_2did123");

        let a = ApplicationIdentity::parse("a_b").unwrap();
        let b = ApplicationIdentity::parse("a.b").unwrap();
        assert_ne!(ObjectPath::for_identity(&a), ObjectPath::for_identity(&b));
    }

    #[test]
    fn failed_reply_surfaces_its_failure() {
        let reply = Reply::failed(ErrorKind::Protocol, "boom");
        let failure = reply.into_bool().unwrap_err();
        assert_eq!(failure.kind, ErrorKind::Protocol);
        assert_eq!(failure.message, "boom");
    }

    #[test]
    fn mismatched_reply_is_a_protocol_failure() {
        let failure = Reply::Ack.into_path().unwrap_err();
        assert_eq!(failure.kind, ErrorKind::Protocol);
    }

    #[test]
    fn requests_serialize_with_method_tag() {
        let json = serde_json::to_value(Request::SetUserAgentString {
            value: "UA/1.0".into(),
        })
        .unwrap();
        assert_eq!(json["method"], "SetUserAgentString");
        assert_eq!(json["value"], "UA/1.0");
    }
}
