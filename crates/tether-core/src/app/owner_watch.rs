//! OwnerWatch - owner プロセスの生存監視
//!
//! バスの owner 変化を購読し、owner が空文字列になった（= 相手が消えた）ら
//! `on_gone` を 1 回だけ実行します。タイムアウトやポーリングはありません。
//! `on_gone` は独立したタスクで動くので、その中から監視を drop してもよい。
//! 監視は drop で止まります。

use std::future::Future;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::ports::BusName;

pub struct OwnerWatch {
    owner: BusName,
    task: JoinHandle<()>,
}

impl OwnerWatch {
    pub fn spawn<F, Fut>(owner: BusName, mut presence: watch::Receiver<String>, on_gone: F) -> Self
    where
        F: FnOnce(BusName) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let watched = owner.clone();
        let task = tokio::spawn(async move {
            loop {
                if presence.borrow_and_update().is_empty() {
                    break;
                }
                if presence.changed().await.is_err() {
                    // バスそのものが消えた
                    break;
                }
            }
            info!(owner = %watched, "owner left the bus");
            tokio::spawn(on_gone(watched));
        });
        debug!(owner = %owner, "watching owner");
        Self { owner, task }
    }

    pub fn owner(&self) -> &BusName {
        &self.owner
    }

    /// True once the owner has been seen leaving.
    pub fn has_fired(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for OwnerWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}
