//! ControlRegistry - 制御オブジェクトの公開と片付け
//!
//! 1 インスタンス ↔ 1 公開オブジェクト ↔ 1 OwnerWatch。
//! Coordinator の EventSink として登録され、`Terminated` を受けると
//! オブジェクトを unexport し、監視を止めます。
//!
//! owner が消えたときの Terminate は監視側のタスクから Coordinator を呼ぶので、
//! このレジストリは Coordinator を直接は持ちません。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::control::{ControlError, ControlObject, ControlTimeouts};
use super::coordinator::Coordinator;
use super::io_context::IoContext;
use super::owner_watch::OwnerWatch;
use super::status::InstanceInfo;
use crate::codec::EncodedBundle;
use crate::domain::{DomainEvent, InstanceId};
use crate::ports::{BusName, ChannelHandle, ControlBus, EventSink, ObjectPath};

struct ControlRegistration {
    object: Arc<ControlObject>,
    _watch: OwnerWatch,
}

pub struct ControlRegistry {
    bus: Arc<dyn ControlBus>,
    io: Arc<IoContext>,
    timeouts: ControlTimeouts,
    entries: Mutex<HashMap<InstanceId, ControlRegistration>>,
}

impl ControlRegistry {
    pub fn new(bus: Arc<dyn ControlBus>, io: Arc<IoContext>, timeouts: ControlTimeouts) -> Self {
        Self {
            bus,
            io,
            timeouts,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Export the control object for `info`, owned by `owner`.
    ///
    /// An instance that already has an object keeps it; its path is returned
    /// and a given bundle replaces the stored one.
    pub async fn attach(
        &self,
        coordinator: &Arc<Coordinator>,
        info: &InstanceInfo,
        owner: BusName,
        bundle: Option<EncodedBundle>,
    ) -> Result<ObjectPath, ControlError> {
        if let Some(existing) = self.object(info.id) {
            if let Some(bundle) = bundle {
                existing.save_encoded_bundle(bundle)?;
            }
            debug!(instance = %info.id, path = %existing.path(), "control object already exported");
            return Ok(existing.path().clone());
        }

        let object = Arc::new(ControlObject::new(
            info.id,
            info.identity.clone(),
            owner.clone(),
            Arc::downgrade(coordinator),
            self.io.clone(),
            self.timeouts,
        ));
        if let Some(bundle) = bundle {
            object.save_encoded_bundle(bundle)?;
        }
        let path = object.path().clone();
        self.bus.export(path.clone(), object.clone()).await?;

        let instance = info.id;
        let weak = Arc::downgrade(coordinator);
        let watch = OwnerWatch::spawn(owner.clone(), self.bus.watch_owner(&owner), move |owner| async move {
            if let Some(coordinator) = weak.upgrade() {
                warn!(instance = %instance, owner = %owner, "owner gone; terminating");
                coordinator.terminate_instance(instance).await;
            }
        });

        self.entries.lock().insert(
            instance,
            ControlRegistration {
                object,
                _watch: watch,
            },
        );
        // export の await 中に Terminate が済んでいたら、Terminated はもう届かない
        if coordinator.instance(instance).is_none() {
            warn!(instance = %instance, path = %path, "instance terminated during export; rolling back");
            self.detach(instance).await;
            return Err(ControlError::InstanceGone(instance));
        }
        info!(instance = %instance, path = %path, owner = %owner, "control object exported");
        Ok(path)
    }

    /// Unexport and stop watching. Unknown ids are ignored.
    pub async fn detach(&self, instance: InstanceId) {
        let removed = self.entries.lock().remove(&instance);
        let Some(registration) = removed else {
            return;
        };
        let path = registration.object.path().clone();
        if let Err(err) = self.bus.unexport(&path).await {
            warn!(instance = %instance, path = %path, error = %err, "unexport failed");
        }
        debug!(instance = %instance, path = %path, "control object torn down");
    }

    pub fn object(&self, instance: InstanceId) -> Option<Arc<ControlObject>> {
        self.entries
            .lock()
            .get(&instance)
            .map(|registration| registration.object.clone())
    }

    pub fn path_of(&self, instance: InstanceId) -> Option<ObjectPath> {
        self.object(instance).map(|object| object.path().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Engine side: hand the extension process channel to the instance's object.
    pub fn set_extension_channel(
        &self,
        instance: InstanceId,
        handle: ChannelHandle,
    ) -> Option<Result<u64, ControlError>> {
        self.object(instance)
            .map(|object| object.set_extension_channel(handle))
    }
}

#[async_trait]
impl EventSink for ControlRegistry {
    async fn emit(&self, event: &DomainEvent) {
        if let DomainEvent::Terminated { instance, .. } = event {
            self.detach(*instance).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LaunchRequest;
    use crate::impls::{InMemoryBus, StubEngine};
    use crate::ports::{SystemClock, UlidGenerator};
    use std::time::Duration;

    struct Fixture {
        bus: InMemoryBus,
        runtime_name: BusName,
        registry: Arc<ControlRegistry>,
        coordinator: Arc<Coordinator>,
        engine: Arc<StubEngine>,
    }

    fn fixture() -> Fixture {
        let bus = InMemoryBus::new();
        let connection = Arc::new(bus.connect());
        let runtime_name = connection.unique_name().clone();
        let engine = Arc::new(StubEngine::new());
        let io = Arc::new(IoContext::spawn(engine.clone()).unwrap());
        let registry = Arc::new(ControlRegistry::new(
            connection,
            io,
            ControlTimeouts {
                io_handoff: Duration::from_secs(2),
                channel_wait: Duration::from_secs(5),
            },
        ));
        let coordinator = Arc::new(Coordinator::new(
            engine.clone(),
            Arc::new(UlidGenerator::new(SystemClock)),
            Arc::new(SystemClock),
            vec![registry.clone() as Arc<dyn EventSink>],
        ));
        Fixture {
            bus,
            runtime_name,
            registry,
            coordinator,
            engine,
        }
    }

    async fn launch(f: &Fixture, app: &str) -> InstanceInfo {
        f.coordinator
            .reset(&LaunchRequest::positional(vec![app.to_string()]))
            .await
            .unwrap()
            .instance()
            .clone()
    }

    #[tokio::test]
    async fn attach_twice_returns_the_same_path() {
        let f = fixture();
        let owner = f.bus.connect();
        let info = launch(&f, "exec-id123").await;

        let first = f
            .registry
            .attach(&f.coordinator, &info, owner.unique_name().clone(), None)
            .await
            .unwrap();
        let second = f
            .registry
            .attach(&f.coordinator, &info, owner.unique_name().clone(), None)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(f.registry.len(), 1);
        assert!(f.bus.is_exported(&f.runtime_name, &first));
    }

    #[tokio::test]
    async fn terminated_instance_is_unexported() {
        let f = fixture();
        let owner = f.bus.connect();
        let info = launch(&f, "exec-id123").await;
        let path = f
            .registry
            .attach(&f.coordinator, &info, owner.unique_name().clone(), None)
            .await
            .unwrap();

        f.coordinator.terminate_instance(info.id).await;

        assert!(f.registry.is_empty());
        assert!(!f.bus.is_exported(&f.runtime_name, &path));
        assert_eq!(f.engine.total_terminations(), 1);
    }

    #[tokio::test]
    async fn attach_after_terminate_rolls_back_the_export() {
        let f = fixture();
        let owner = f.bus.connect();
        let info = launch(&f, "exec-id123").await;
        f.coordinator.terminate_instance(info.id).await;

        let err = f
            .registry
            .attach(&f.coordinator, &info, owner.unique_name().clone(), None)
            .await
            .unwrap_err();

        assert!(matches!(err, ControlError::InstanceGone(id) if id == info.id));
        assert!(f.registry.is_empty());
        assert!(!f
            .bus
            .is_exported(&f.runtime_name, &ObjectPath::for_identity(&info.identity)));
    }

    #[tokio::test]
    async fn extension_channel_reaches_the_object() {
        let f = fixture();
        let owner = f.bus.connect();
        let info = launch(&f, "exec-id123").await;
        f.registry
            .attach(&f.coordinator, &info, owner.unique_name().clone(), None)
            .await
            .unwrap();

        let generation = f
            .registry
            .set_extension_channel(info.id, ChannelHandle::named("ext"))
            .unwrap()
            .unwrap();
        assert_eq!(generation, 0);
        assert!(f
            .registry
            .set_extension_channel(InstanceId::from_ulid(ulid::Ulid::nil()), ChannelHandle::named("x"))
            .is_none());
    }
}
