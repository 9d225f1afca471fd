//! Status - 診断用のスナップショット

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ApplicationIdentity, InstanceId, LifecycleState};

/// 1 世代分のインスタンス情報
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceInfo {
    pub id: InstanceId,
    pub identity: ApplicationIdentity,
    pub state: LifecycleState,
    pub launched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceCounts {
    pub launching: usize,
    pub running: usize,
    pub suspended: usize,
}

impl InstanceCounts {
    pub fn record(&mut self, state: LifecycleState) {
        match state {
            LifecycleState::Launching => self.launching += 1,
            LifecycleState::Running => self.running += 1,
            LifecycleState::Suspended => self.suspended += 1,
            LifecycleState::NoApp | LifecycleState::Terminated => {}
        }
    }

    pub fn total(&self) -> usize {
        self.launching + self.running + self.suspended
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusView {
    /// current インスタンスから見た状態
    pub state: LifecycleState,
    pub current: Option<InstanceInfo>,
    pub counts: InstanceCounts,
}
