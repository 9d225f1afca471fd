//! ControlObject - アプリケーションごとのバス公開オブジェクト
//!
//! # 学習ポイント
//! - インスタンスは持たない: `Weak<Coordinator>` + `InstanceId` だけを持つ
//! - エラーは必ず `Reply::Failed` に変換して返す（バスを越えるのは Reply だけ）
//! - I/O スレッドへの受け渡しは IoContext 経由、待ちには上限がある

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

use super::channel_slot::{ChannelError, ChannelSlot};
use super::coordinator::{Coordinator, LifecycleError};
use super::io_context::{IoContext, IoError};
use crate::codec::{CodecError, EncodedBundle};
use crate::domain::{ApplicationIdentity, ErrorKind, InstanceId, TransitionOutcome};
use crate::ports::{BusError, BusName, ChannelHandle, MethodHandler, ObjectPath, Reply, Request};

#[derive(Debug, Clone, Error)]
pub enum ControlError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Io(#[from] IoError),

    #[error("malformed bundle: {0}")]
    Codec(String),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error("instance {0} terminated before its control object was exported")]
    InstanceGone(InstanceId),
}

impl From<CodecError> for ControlError {
    fn from(err: CodecError) -> Self {
        ControlError::Codec(err.to_string())
    }
}

impl ControlError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ControlError::Lifecycle(err) => err.kind(),
            ControlError::Channel(err) => err.kind(),
            ControlError::Io(err) => err.kind(),
            ControlError::Codec(_) => ErrorKind::Protocol,
            ControlError::Bus(err) => err.kind(),
            ControlError::InstanceGone(_) => ErrorKind::Resolution,
        }
    }

    pub fn into_reply(self) -> Reply {
        Reply::failed(self.kind(), self.to_string())
    }
}

/// Wait bounds for the object's blocking methods.
#[derive(Debug, Clone, Copy)]
pub struct ControlTimeouts {
    pub io_handoff: Duration,
    pub channel_wait: Duration,
}

pub struct ControlObject {
    instance: InstanceId,
    identity: ApplicationIdentity,
    path: ObjectPath,
    owner: BusName,
    coordinator: Weak<Coordinator>,
    io: Arc<IoContext>,
    channel: ChannelSlot,
    bundle: Mutex<Option<EncodedBundle>>,
    timeouts: ControlTimeouts,
}

impl ControlObject {
    pub fn new(
        instance: InstanceId,
        identity: ApplicationIdentity,
        owner: BusName,
        coordinator: Weak<Coordinator>,
        io: Arc<IoContext>,
        timeouts: ControlTimeouts,
    ) -> Self {
        let path = ObjectPath::for_identity(&identity);
        Self {
            instance,
            identity,
            path,
            owner,
            coordinator,
            io,
            channel: ChannelSlot::new(),
            bundle: Mutex::new(None),
            timeouts,
        }
    }

    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    pub fn identity(&self) -> &ApplicationIdentity {
        &self.identity
    }

    pub fn path(&self) -> &ObjectPath {
        &self.path
    }

    pub fn owner(&self) -> &BusName {
        &self.owner
    }

    /// Engine side: publish the extension process channel.
    pub fn set_extension_channel(&self, handle: ChannelHandle) -> Result<u64, ControlError> {
        Ok(self.channel.set(handle)?)
    }

    pub fn encoded_bundle(&self) -> Option<EncodedBundle> {
        self.bundle.lock().clone()
    }

    /// Store `bundle` after checking it decodes.
    pub fn save_encoded_bundle(&self, bundle: EncodedBundle) -> Result<(), ControlError> {
        bundle.decode()?;
        *self.bundle.lock() = Some(bundle);
        Ok(())
    }

    async fn terminate(&self) {
        // Coordinator がもう無ければインスタンスも無い
        if let Some(coordinator) = self.coordinator.upgrade() {
            coordinator.terminate_instance(self.instance).await;
        }
    }

    async fn suspend(&self) -> Result<bool, ControlError> {
        let Some(coordinator) = self.coordinator.upgrade() else {
            return Ok(false);
        };
        let outcome = coordinator.suspend_instance(self.instance).await?;
        Ok(outcome.reached_target())
    }

    async fn resume(&self) -> Result<bool, ControlError> {
        let Some(coordinator) = self.coordinator.upgrade() else {
            return Ok(false);
        };
        let outcome = coordinator.resume_instance(self.instance).await?;
        if let TransitionOutcome::Ignored { state, .. } = outcome {
            debug!(instance = %self.instance, state = %state, "resume ignored");
        }
        Ok(outcome.reached_target())
    }

    async fn hide(&self) -> Result<bool, ControlError> {
        let Some(coordinator) = self.coordinator.upgrade() else {
            return Ok(false);
        };
        Ok(coordinator.hide_instance(self.instance).await?)
    }

    async fn dispatch(&self, request: Request) -> Result<Reply, ControlError> {
        let reply = match request {
            Request::Terminate => {
                self.terminate().await;
                Reply::Ack
            }
            Request::GetExtensionProcessChannel => {
                Reply::Channel(self.channel.take(self.timeouts.channel_wait).await?)
            }
            Request::Suspend => Reply::Bool(self.suspend().await?),
            Request::Resume => Reply::Bool(self.resume().await?),
            Request::Hide => Reply::Bool(self.hide().await?),
            Request::SetUserAgentString { value } => {
                self.io.set_user_agent(value, self.timeouts.io_handoff).await?;
                Reply::Ack
            }
            Request::GetEncodedBundle => Reply::Bundle(self.encoded_bundle()),
            Request::SaveEncodedBundle { bundle } => {
                self.save_encoded_bundle(bundle)?;
                Reply::Ack
            }
            Request::RemoveAllCookies => {
                self.io.remove_all_cookies()?;
                Reply::Ack
            }
            other @ (Request::Launch { .. } | Request::IsApplicationRunning { .. }) => {
                Reply::unknown_method(&other)
            }
        };
        Ok(reply)
    }
}

#[async_trait]
impl MethodHandler for ControlObject {
    async fn handle(&self, sender: &BusName, request: Request) -> Reply {
        let method = request.method_name();
        debug!(path = %self.path, sender = %sender, method, "control call");
        match self.dispatch(request).await {
            Ok(reply) => reply,
            Err(err) => {
                warn!(path = %self.path, method, error = %err, "control call failed");
                err.into_reply()
            }
        }
    }
}
