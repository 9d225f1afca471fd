//! InMemoryBus - 開発用・テスト用の制御バス
//!
//! # 学習ポイント
//! - 1 つの共有状態に複数の接続（`BusConnection`）がぶら下がる構造
//! - `watch` チャネルでの名前所有者の通知（空文字列 = 所有者なし）
//! - ハンドラ呼び出しはロックを外してから await する
//!
//! 接続を drop すると、その接続が持っていた名前とオブジェクトが消え、
//! 監視者には `""` が届きます。プロセスのクラッシュと同じ見え方です。
//! unique name は再利用されないので、その監視チャネルは通知後に捨てます。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::debug;

use crate::ports::{BusError, BusName, ControlBus, MethodHandler, ObjectPath, Reply, Request};

#[derive(Default)]
struct BusState {
    next_connection: u64,
    /// 接続中の unique name
    live: HashSet<BusName>,
    /// well-known name → unique name
    owners: HashMap<BusName, BusName>,
    objects: HashMap<(BusName, ObjectPath), Arc<dyn MethodHandler>>,
    watchers: HashMap<BusName, watch::Sender<String>>,
}

impl BusState {
    fn owner_of(&self, name: &BusName) -> Option<BusName> {
        if name.is_unique() {
            self.live.contains(name).then(|| name.clone())
        } else {
            self.owners.get(name).cloned()
        }
    }

    fn publish(&self, name: &BusName) {
        if let Some(sender) = self.watchers.get(name) {
            let owner = self
                .owner_of(name)
                .map(|owner| owner.as_str().to_owned())
                .unwrap_or_default();
            sender.send_replace(owner);
        }
    }

    fn release(&mut self, unique: &BusName) {
        if !self.live.remove(unique) {
            return;
        }
        let released: Vec<BusName> = self
            .owners
            .iter()
            .filter(|(_, owner)| *owner == unique)
            .map(|(name, _)| name.clone())
            .collect();
        for name in &released {
            self.owners.remove(name);
        }
        self.objects.retain(|(owner, _), _| owner != unique);

        self.publish(unique);
        self.watchers.remove(unique);
        for name in &released {
            self.publish(name);
        }
        self.prune_watchers();
    }

    /// 購読者のいない監視チャネルを捨てる
    fn prune_watchers(&mut self) {
        self.watchers.retain(|_, sender| sender.receiver_count() > 0);
    }
}

/// InMemoryBus は接続を払い出す共有バス
///
/// # 使用例
/// ```ignore
/// let bus = InMemoryBus::new();
/// let runtime = bus.connect();
/// let launcher = bus.connect();
/// ```
#[derive(Clone, Default)]
pub struct InMemoryBus {
    state: Arc<Mutex<BusState>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// 新しい接続を作る（unique name は `:1.N`）
    pub fn connect(&self) -> BusConnection {
        let mut state = self.state.lock();
        state.next_connection += 1;
        let unique = BusName::new(format!(":1.{}", state.next_connection));
        state.live.insert(unique.clone());
        state.publish(&unique);
        debug!(name = %unique, "bus connection opened");

        BusConnection {
            unique,
            state: self.state.clone(),
        }
    }

    pub fn has_owner(&self, name: &BusName) -> bool {
        self.state.lock().owner_of(name).is_some()
    }

    pub fn is_exported(&self, owner: &BusName, path: &ObjectPath) -> bool {
        let state = self.state.lock();
        match state.owner_of(owner) {
            Some(unique) => state.objects.contains_key(&(unique, path.clone())),
            None => false,
        }
    }
}

/// 1 プロセス分の接続
pub struct BusConnection {
    unique: BusName,
    state: Arc<Mutex<BusState>>,
}

impl BusConnection {
    /// 接続を切る（drop と同じ）
    pub fn disconnect(&self) {
        self.state.lock().release(&self.unique);
        debug!(name = %self.unique, "bus connection closed");
    }

    fn ensure_live(&self, state: &BusState) -> Result<(), BusError> {
        if state.live.contains(&self.unique) {
            Ok(())
        } else {
            Err(BusError::Disconnected)
        }
    }
}

impl Drop for BusConnection {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[async_trait]
impl ControlBus for BusConnection {
    fn unique_name(&self) -> &BusName {
        &self.unique
    }

    async fn request_name(&self, name: &BusName) -> Result<(), BusError> {
        let mut state = self.state.lock();
        self.ensure_live(&state)?;
        match state.owners.get(name) {
            Some(owner) if *owner == self.unique => return Ok(()),
            Some(_) => return Err(BusError::NameTaken(name.clone())),
            None => {}
        }
        state.owners.insert(name.clone(), self.unique.clone());
        state.publish(name);
        debug!(name = %name, owner = %self.unique, "bus name acquired");
        Ok(())
    }

    async fn export(&self, path: ObjectPath, handler: Arc<dyn MethodHandler>) -> Result<(), BusError> {
        let mut state = self.state.lock();
        self.ensure_live(&state)?;
        let key = (self.unique.clone(), path);
        if state.objects.contains_key(&key) {
            return Err(BusError::PathInUse(key.1));
        }
        debug!(path = %key.1, owner = %self.unique, "object exported");
        state.objects.insert(key, handler);
        Ok(())
    }

    async fn unexport(&self, path: &ObjectPath) -> Result<(), BusError> {
        let mut state = self.state.lock();
        self.ensure_live(&state)?;
        match state.objects.remove(&(self.unique.clone(), path.clone())) {
            Some(_) => {
                debug!(path = %path, owner = %self.unique, "object unexported");
                Ok(())
            }
            None => Err(BusError::UnknownObject(path.clone())),
        }
    }

    async fn call(
        &self,
        destination: &BusName,
        path: &ObjectPath,
        request: Request,
    ) -> Result<Reply, BusError> {
        let handler = {
            let state = self.state.lock();
            self.ensure_live(&state)?;
            let owner = state
                .owner_of(destination)
                .ok_or_else(|| BusError::ServiceUnknown(destination.clone()))?;
            state
                .objects
                .get(&(owner, path.clone()))
                .cloned()
                .ok_or_else(|| BusError::UnknownObject(path.clone()))?
        };

        debug!(
            sender = %self.unique,
            destination = %destination,
            path = %path,
            method = request.method_name(),
            "bus call"
        );
        Ok(handler.handle(&self.unique, request).await)
    }

    fn watch_owner(&self, name: &BusName) -> watch::Receiver<String> {
        let mut state = self.state.lock();
        if let Some(sender) = state.watchers.get(name) {
            return sender.subscribe();
        }
        let owner = state
            .owner_of(name)
            .map(|owner| owner.as_str().to_owned())
            .unwrap_or_default();
        let (sender, receiver) = watch::channel(owner);
        if name.is_unique() && !state.live.contains(name) {
            return receiver;
        }
        state.prune_watchers();
        state.watchers.insert(name.clone(), sender);
        receiver
    }
}
