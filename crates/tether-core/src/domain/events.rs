//! Events - プラットフォームイベントとドメインイベント
//!
//! - [`AppEvent`]: ライフサイクルデーモンから届く生のイベントコード
//! - [`PlatformEvent`]: AppEvent + （Reset のときだけ意味を持つ）bundle
//! - [`DomainEvent`]: Coordinator が状態遷移の結果として発行するイベント

use std::fmt;

use serde::{Deserialize, Serialize};

use super::identity::ApplicationIdentity;
use super::ids::InstanceId;
use crate::codec::Bundle;

/// Lifecycle event codes delivered by the host daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppEvent {
    Unknown,
    Create,
    Terminate,
    Pause,
    Resume,
    Reset,
    LowMemPost,
    MemFlush,
}

impl AppEvent {
    /// Map the daemon's numeric code. Out-of-range codes become `Unknown`.
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => AppEvent::Create,
            2 => AppEvent::Terminate,
            3 => AppEvent::Pause,
            4 => AppEvent::Resume,
            5 => AppEvent::Reset,
            6 => AppEvent::LowMemPost,
            7 => AppEvent::MemFlush,
            _ => AppEvent::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AppEvent::Unknown => "unknown",
            AppEvent::Create => "create",
            AppEvent::Terminate => "terminate",
            AppEvent::Pause => "pause",
            AppEvent::Resume => "resume",
            AppEvent::Reset => "reset",
            AppEvent::LowMemPost => "low_mem_post",
            AppEvent::MemFlush => "mem_flush",
        }
    }
}

impl fmt::Display for AppEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One callback from the lifecycle daemon.
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformEvent {
    pub event: AppEvent,
    pub bundle: Option<Bundle>,
}

impl PlatformEvent {
    pub fn new(event: AppEvent) -> Self {
        Self {
            event,
            bundle: None,
        }
    }

    pub fn reset(bundle: Option<Bundle>) -> Self {
        Self {
            event: AppEvent::Reset,
            bundle,
        }
    }
}

/// DomainEvent はドメインで発生したイベント
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    Launched {
        instance: InstanceId,
        identity: ApplicationIdentity,
    },
    LaunchFailed {
        identity: ApplicationIdentity,
        reason: String,
    },
    Suspended {
        instance: InstanceId,
        identity: ApplicationIdentity,
    },
    Resumed {
        instance: InstanceId,
        identity: ApplicationIdentity,
    },
    Terminated {
        instance: InstanceId,
        identity: ApplicationIdentity,
    },
}

impl DomainEvent {
    pub fn instance(&self) -> Option<InstanceId> {
        match self {
            DomainEvent::Launched { instance, .. }
            | DomainEvent::Suspended { instance, .. }
            | DomainEvent::Resumed { instance, .. }
            | DomainEvent::Terminated { instance, .. } => Some(*instance),
            DomainEvent::LaunchFailed { .. } => None,
        }
    }

    pub fn identity(&self) -> &ApplicationIdentity {
        match self {
            DomainEvent::Launched { identity, .. }
            | DomainEvent::LaunchFailed { identity, .. }
            | DomainEvent::Suspended { identity, .. }
            | DomainEvent::Resumed { identity, .. }
            | DomainEvent::Terminated { identity, .. } => identity,
        }
    }
}
