//! ControlBus port - プロセス間の制御バス
//!
//! D-Bus 相当の最小限の機能:
//! - オブジェクトの export / unexport
//! - メソッド呼び出し（[`Request`] → [`Reply`]）
//! - 名前の所有者変化の監視（新しい owner が空文字列 ⇒ 相手が消えた）

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;

use super::protocol::{BusName, ObjectPath, Reply, Request};
use crate::domain::ErrorKind;

#[derive(Debug, Clone, Error)]
pub enum BusError {
    #[error("no owner for bus name {0}")]
    ServiceUnknown(BusName),

    #[error("no object exported at {0}")]
    UnknownObject(ObjectPath),

    #[error("object path {0} is already exported")]
    PathInUse(ObjectPath),

    #[error("bus name {0} is owned by another connection")]
    NameTaken(BusName),

    #[error("connection is closed")]
    Disconnected,
}

impl BusError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Bus
    }
}

/// Receives method calls for one exported object.
#[async_trait]
pub trait MethodHandler: Send + Sync {
    async fn handle(&self, sender: &BusName, request: Request) -> Reply;
}

/// One process's connection to the control bus.
#[async_trait]
pub trait ControlBus: Send + Sync {
    /// The connection's unique name (`:1.N`).
    fn unique_name(&self) -> &BusName;

    async fn request_name(&self, name: &BusName) -> Result<(), BusError>;

    async fn export(&self, path: ObjectPath, handler: Arc<dyn MethodHandler>) -> Result<(), BusError>;

    async fn unexport(&self, path: &ObjectPath) -> Result<(), BusError>;

    async fn call(
        &self,
        destination: &BusName,
        path: &ObjectPath,
        request: Request,
    ) -> Result<Reply, BusError>;

    /// Current owner of `name` and every later change (`""` ⇒ no owner).
    fn watch_owner(&self, name: &BusName) -> watch::Receiver<String>;
}
