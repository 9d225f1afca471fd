//! InMemoryDaemon - テスト・デモ用のライフサイクルデーモン
//!
//! イベントのチャネルは生成時に作るので、登録前に `deliver` した
//! イベントもバッファされ、登録後に順番どおり届きます。

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::domain::PlatformEvent;
use crate::ports::{DaemonError, LifecycleDaemon, Registration};

/// 記録された登録要求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationRecord {
    pub name: String,
    pub args: Vec<String>,
}

struct DaemonState {
    sender: Option<mpsc::UnboundedSender<PlatformEvent>>,
    receiver: Option<mpsc::UnboundedReceiver<PlatformEvent>>,
    rejection: Option<String>,
    registrations: Vec<RegistrationRecord>,
}

pub struct InMemoryDaemon {
    state: Mutex<DaemonState>,
}

impl InMemoryDaemon {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            state: Mutex::new(DaemonState {
                sender: Some(sender),
                receiver: Some(receiver),
                rejection: None,
                registrations: Vec::new(),
            }),
        }
    }

    /// 以後の登録を `reason` で拒否する
    pub fn fail_registration(&self, reason: impl Into<String>) {
        self.state.lock().rejection = Some(reason.into());
    }

    /// Queue an event for the registered process. Returns `false` once the
    /// receiving side is gone.
    pub fn deliver(&self, event: PlatformEvent) -> bool {
        let state = self.state.lock();
        match &state.sender {
            Some(sender) => sender.send(event).is_ok(),
            None => false,
        }
    }

    /// Close the event stream; the registration sees `None` after the
    /// buffered events.
    pub fn hang_up(&self) {
        self.state.lock().sender = None;
    }

    pub fn registrations(&self) -> Vec<RegistrationRecord> {
        self.state.lock().registrations.clone()
    }
}

impl Default for InMemoryDaemon {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LifecycleDaemon for InMemoryDaemon {
    async fn register(&self, name: &str, args: &[String]) -> Result<Registration, DaemonError> {
        let mut state = self.state.lock();
        state.registrations.push(RegistrationRecord {
            name: name.to_owned(),
            args: args.to_vec(),
        });

        if let Some(reason) = &state.rejection {
            warn!(name, reason = %reason, "daemon rejected registration");
            return Err(DaemonError::Rejected {
                name: name.to_owned(),
                reason: reason.clone(),
            });
        }

        let receiver = state
            .receiver
            .take()
            .ok_or_else(|| DaemonError::AlreadyRegistered {
                name: name.to_owned(),
            })?;
        debug!(name, "registered with lifecycle daemon");
        Ok(Registration::new(name, receiver))
    }
}
