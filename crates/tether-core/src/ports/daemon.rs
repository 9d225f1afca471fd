//! LifecycleDaemon port - ホスト OS のアプリ管理デーモン
//!
//! 登録は 1 プロセス 1 回。登録が返す [`Registration`] がイベントの
//! 受け口そのもので、グローバルなコールバックテーブルは持ちません。

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::domain::{ErrorKind, PlatformEvent};

#[derive(Debug, Clone, Error)]
pub enum DaemonError {
    #[error("daemon rejected registration {name}: {reason}")]
    Rejected { name: String, reason: String },

    #[error("this process is already registered (requested {name})")]
    AlreadyRegistered { name: String },
}

impl DaemonError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Registration
    }
}

/// The one live registration of this process.
#[derive(Debug)]
pub struct Registration {
    name: String,
    events: mpsc::UnboundedReceiver<PlatformEvent>,
}

impl Registration {
    pub fn new(name: impl Into<String>, events: mpsc::UnboundedReceiver<PlatformEvent>) -> Self {
        Self {
            name: name.into(),
            events,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Next event in delivery order; `None` once the daemon hangs up.
    pub async fn next_event(&mut self) -> Option<PlatformEvent> {
        self.events.recv().await
    }
}

#[async_trait]
pub trait LifecycleDaemon: Send + Sync {
    /// Register under `name`, passing the platform's positional parameters.
    async fn register(&self, name: &str, args: &[String]) -> Result<Registration, DaemonError>;
}
