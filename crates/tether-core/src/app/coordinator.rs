//! Coordinator - アプリケーションインスタンスのライフサイクル管理
//!
//! # 学習ポイント
//! - 遷移の直列化: すべての遷移は `ops`（tokio Mutex、FIFO）を取ってから行う。
//!   Reset の launch 中に届いたイベントはその後ろに並ぶ。
//! - 状態の参照: `state` は parking_lot の Mutex で、await をまたいで持たない。
//!   launch 中でも `state()` / `status()` はすぐ返る。
//! - current は `Option<InstanceId>`。失敗した Reset はどのインスタンスにも触れない。
//! - 状態の変化は `watch_state()` で購読できる（ポーリング不要）。
//!
//! # 状態遷移
//! ```text
//! NoApp ──Reset──▶ Launching ──ok──▶ Running ◀──Resume── Suspended
//!                      │                 │  ──Pause──▶       │
//!                      └──err──▶ NoApp   └────Terminate──────┴──▶ Terminated
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::status::{InstanceCounts, InstanceInfo, StatusView};
use crate::domain::{
    AppEvent, ApplicationIdentity, DomainEvent, ErrorKind, IdentityError, InstanceId,
    LaunchRequest, LifecycleCommand, LifecycleState, TransitionOutcome,
};
use crate::ports::{Application, ApplicationService, Clock, EngineError, EventSink, IdGenerator};

#[derive(Debug, Clone, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("failed to launch {identity}: {source}")]
    LaunchFailed {
        identity: ApplicationIdentity,
        #[source]
        source: EngineError,
    },

    #[error("{command} failed for {instance}: {source}")]
    Engine {
        instance: InstanceId,
        command: LifecycleCommand,
        #[source]
        source: EngineError,
    },
}

impl LifecycleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LifecycleError::Identity(_) => ErrorKind::Identity,
            LifecycleError::LaunchFailed { .. } => ErrorKind::Resolution,
            LifecycleError::Engine { .. } => ErrorKind::Engine,
        }
    }
}

/// Reset の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetOutcome {
    /// 新しい世代を起動した
    Launched(InstanceInfo),
    /// 同じ identity の生きているインスタンスをそのまま使った
    AlreadyRunning(InstanceInfo),
}

impl ResetOutcome {
    pub fn instance(&self) -> &InstanceInfo {
        match self {
            ResetOutcome::Launched(info) | ResetOutcome::AlreadyRunning(info) => info,
        }
    }

    pub fn is_new_launch(&self) -> bool {
        matches!(self, ResetOutcome::Launched(_))
    }
}

struct ApplicationInstance {
    info: InstanceInfo,
    app: Arc<dyn Application>,
}

struct CoordinatorState {
    instances: HashMap<InstanceId, ApplicationInstance>,
    current: Option<InstanceId>,
    launching: Option<ApplicationIdentity>,
    /// current がないときに見せる状態（NoApp か Terminated）
    idle: LifecycleState,
}

impl CoordinatorState {
    fn live_instance_for(&self, identity: &ApplicationIdentity) -> Option<&ApplicationInstance> {
        self.instances
            .values()
            .filter(|instance| instance.info.identity == *identity)
            .max_by_key(|instance| instance.info.id)
    }
}

/// Coordinator はインスタンスを排他的に所有する
///
/// 制御オブジェクトなど外側のコンポーネントは `Weak<Coordinator>` と
/// `InstanceId` だけを持ち、インスタンスそのものには触れません。
pub struct Coordinator {
    service: Arc<dyn ApplicationService>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    sinks: Vec<Arc<dyn EventSink>>,
    ops: tokio::sync::Mutex<()>,
    state: Mutex<CoordinatorState>,
    state_tx: watch::Sender<LifecycleState>,
}

impl Coordinator {
    /// `sinks` are notified in order after every transition.
    pub fn new(
        service: Arc<dyn ApplicationService>,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
        sinks: Vec<Arc<dyn EventSink>>,
    ) -> Self {
        let (state_tx, _) = watch::channel(LifecycleState::NoApp);
        Self {
            service,
            ids,
            clock,
            sinks,
            ops: tokio::sync::Mutex::new(()),
            state: Mutex::new(CoordinatorState {
                instances: HashMap::new(),
                current: None,
                launching: None,
                idle: LifecycleState::NoApp,
            }),
            state_tx,
        }
    }

    /// Reset: resolve the identity and make its instance current, launching
    /// it if no live instance exists.
    ///
    /// # エラー
    /// - `Identity`: 副作用なし
    /// - `LaunchFailed`: 状態は NoApp、既存インスタンスには触れない
    pub async fn reset(&self, request: &LaunchRequest) -> Result<ResetOutcome, LifecycleError> {
        let identity = ApplicationIdentity::resolve(request.raw_identity())?;
        let params = request.params();

        let _ops = self.ops.lock().await;

        let reused = {
            let mut state = self.state.lock();
            let reused = state
                .live_instance_for(&identity)
                .map(|existing| existing.info.clone());
            match &reused {
                Some(info) => state.current = Some(info.id),
                None => state.launching = Some(identity.clone()),
            }
            reused
        };
        self.publish_state();
        if let Some(info) = reused {
            debug!(instance = %info.id, identity = %identity, "reset reuses live instance");
            return Ok(ResetOutcome::AlreadyRunning(info));
        }

        info!(
            identity = %identity,
            app_control = request.is_app_control(),
            "launching application"
        );
        let launched = self.service.launch(&identity, &params).await;

        let outcome = {
            let mut state = self.state.lock();
            state.launching = None;
            match launched {
                Ok(app) => {
                    let info = InstanceInfo {
                        id: self.ids.generate_instance_id(),
                        identity: identity.clone(),
                        state: LifecycleState::Running,
                        launched_at: self.clock.now(),
                    };
                    state.instances.insert(
                        info.id,
                        ApplicationInstance {
                            info: info.clone(),
                            app,
                        },
                    );
                    state.current = Some(info.id);
                    Ok(info)
                }
                Err(source) => {
                    state.current = None;
                    state.idle = LifecycleState::NoApp;
                    Err(source)
                }
            }
        };
        self.publish_state();

        match outcome {
            Ok(info) => {
                self.emit(DomainEvent::Launched {
                    instance: info.id,
                    identity,
                })
                .await;
                Ok(ResetOutcome::Launched(info))
            }
            Err(source) => {
                self.emit(DomainEvent::LaunchFailed {
                    identity: identity.clone(),
                    reason: source.to_string(),
                })
                .await;
                Err(LifecycleError::LaunchFailed { identity, source })
            }
        }
    }

    /// Create は何もしない（起動は Reset が担う）
    pub async fn create(&self) {
        let _ops = self.ops.lock().await;
        debug!("create event ignored");
    }

    /// Terminate the current instance; benign when there is none.
    pub async fn terminate(&self) -> TransitionOutcome {
        let _ops = self.ops.lock().await;
        match self.current_id() {
            Some(id) => self.terminate_locked(id).await,
            None => {
                debug!("terminate without current instance");
                TransitionOutcome::NoInstance
            }
        }
    }

    pub async fn pause(&self) -> Result<TransitionOutcome, LifecycleError> {
        let _ops = self.ops.lock().await;
        match self.current_id() {
            Some(id) => self.transition_locked(id, LifecycleCommand::Suspend).await,
            None => {
                debug!("pause without current instance");
                Ok(TransitionOutcome::NoInstance)
            }
        }
    }

    pub async fn resume(&self) -> Result<TransitionOutcome, LifecycleError> {
        let _ops = self.ops.lock().await;
        match self.current_id() {
            Some(id) => self.transition_locked(id, LifecycleCommand::Resume).await,
            None => {
                debug!("resume without current instance");
                Ok(TransitionOutcome::NoInstance)
            }
        }
    }

    /// LowMemPost / MemFlush / Unknown
    pub async fn ignore(&self, event: AppEvent) {
        let _ops = self.ops.lock().await;
        debug!(event = %event, "platform event ignored");
    }

    /// Terminate one generation. Unknown or destroyed ids are a no-op.
    pub async fn terminate_instance(&self, id: InstanceId) -> TransitionOutcome {
        let _ops = self.ops.lock().await;
        self.terminate_locked(id).await
    }

    pub async fn suspend_instance(&self, id: InstanceId) -> Result<TransitionOutcome, LifecycleError> {
        let _ops = self.ops.lock().await;
        self.transition_locked(id, LifecycleCommand::Suspend).await
    }

    pub async fn resume_instance(&self, id: InstanceId) -> Result<TransitionOutcome, LifecycleError> {
        let _ops = self.ops.lock().await;
        self.transition_locked(id, LifecycleCommand::Resume).await
    }

    /// Hide the instance's windows. `Ok(false)` when the instance is gone or
    /// not yet settled; the lifecycle state never changes.
    pub async fn hide_instance(&self, id: InstanceId) -> Result<bool, LifecycleError> {
        let _ops = self.ops.lock().await;
        let (state, app) = {
            let state = self.state.lock();
            match state.instances.get(&id) {
                Some(instance) => (instance.info.state, instance.app.clone()),
                None => return Ok(false),
            }
        };
        if !state.accepts_hide() {
            warn!(instance = %id, state = %state, "hide ignored");
            return Ok(false);
        }

        call_engine(app.as_ref(), LifecycleCommand::Hide)
            .await
            .map_err(|source| LifecycleError::Engine {
                instance: id,
                command: LifecycleCommand::Hide,
                source,
            })?;
        debug!(instance = %id, "application hidden");
        Ok(true)
    }

    /// State as seen through the current instance.
    pub fn state(&self) -> LifecycleState {
        let state = self.state.lock();
        if state.launching.is_some() {
            return LifecycleState::Launching;
        }
        state
            .current
            .and_then(|id| state.instances.get(&id))
            .map(|instance| instance.info.state)
            .unwrap_or(state.idle)
    }

    pub fn current(&self) -> Option<InstanceInfo> {
        let state = self.state.lock();
        state
            .current
            .and_then(|id| state.instances.get(&id))
            .map(|instance| instance.info.clone())
    }

    /// Every later change of [`Coordinator::state`].
    pub fn watch_state(&self) -> watch::Receiver<LifecycleState> {
        self.state_tx.subscribe()
    }

    pub fn instance(&self, id: InstanceId) -> Option<InstanceInfo> {
        self.state
            .lock()
            .instances
            .get(&id)
            .map(|instance| instance.info.clone())
    }

    pub fn is_running(&self, identity: &ApplicationIdentity) -> bool {
        self.state.lock().live_instance_for(identity).is_some()
    }

    pub fn status(&self) -> StatusView {
        let mut counts = InstanceCounts::default();
        {
            let state = self.state.lock();
            for instance in state.instances.values() {
                counts.record(instance.info.state);
            }
            if state.launching.is_some() {
                counts.record(LifecycleState::Launching);
            }
        }
        StatusView {
            state: self.state(),
            current: self.current(),
            counts,
        }
    }

    fn current_id(&self) -> Option<InstanceId> {
        self.state.lock().current
    }

    fn publish_state(&self) {
        self.state_tx.send_if_modified(|published| {
            let state = self.state();
            let changed = *published != state;
            *published = state;
            changed
        });
    }

    async fn terminate_locked(&self, id: InstanceId) -> TransitionOutcome {
        let removed = {
            let mut state = self.state.lock();
            let removed = state.instances.remove(&id);
            if removed.is_some() && state.current == Some(id) {
                state.current = None;
                state.idle = LifecycleState::Terminated;
            }
            removed
        };

        let Some(instance) = removed else {
            debug!(instance = %id, "terminate for unknown instance");
            return TransitionOutcome::NoInstance;
        };
        self.publish_state();

        if let Err(err) = instance.app.terminate().await {
            warn!(
                instance = %id,
                identity = %instance.info.identity,
                error = %err,
                "engine terminate failed; instance destroyed anyway"
            );
        }

        let from = instance.info.state;
        self.emit(DomainEvent::Terminated {
            instance: id,
            identity: instance.info.identity,
        })
        .await;
        TransitionOutcome::Applied {
            instance: id,
            from,
            to: LifecycleState::Terminated,
        }
    }

    async fn transition_locked(
        &self,
        id: InstanceId,
        command: LifecycleCommand,
    ) -> Result<TransitionOutcome, LifecycleError> {
        let (from, identity, app) = {
            let state = self.state.lock();
            match state.instances.get(&id) {
                Some(instance) => (
                    instance.info.state,
                    instance.info.identity.clone(),
                    instance.app.clone(),
                ),
                None => return Ok(TransitionOutcome::NoInstance),
            }
        };

        let to = match from.apply(command) {
            None => {
                warn!(instance = %id, state = %from, command = %command, "transition ignored");
                return Ok(TransitionOutcome::Ignored {
                    instance: id,
                    state: from,
                });
            }
            Some(to) if to == from => {
                return Ok(TransitionOutcome::Unchanged {
                    instance: id,
                    state: from,
                });
            }
            Some(to) => to,
        };

        call_engine(app.as_ref(), command)
            .await
            .map_err(|source| LifecycleError::Engine {
                instance: id,
                command,
                source,
            })?;

        if let Some(instance) = self.state.lock().instances.get_mut(&id) {
            instance.info.state = to;
        }
        self.publish_state();

        let event = match to {
            LifecycleState::Suspended => DomainEvent::Suspended { instance: id, identity },
            _ => DomainEvent::Resumed { instance: id, identity },
        };
        self.emit(event).await;

        Ok(TransitionOutcome::Applied {
            instance: id,
            from,
            to,
        })
    }

    async fn emit(&self, event: DomainEvent) {
        for sink in &self.sinks {
            sink.emit(&event).await;
        }
    }
}

async fn call_engine(app: &dyn Application, command: LifecycleCommand) -> Result<(), EngineError> {
    match command {
        LifecycleCommand::Suspend => app.suspend().await,
        LifecycleCommand::Resume => app.resume().await,
        LifecycleCommand::Terminate => app.terminate().await,
        LifecycleCommand::Hide => app.hide().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::StubEngine;
    use crate::ports::{FixedClock, UlidGenerator};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<DomainEvent>>,
    }

    #[async_trait]
    impl EventSink for RecordingSink {
        async fn emit(&self, event: &DomainEvent) {
            self.events.lock().push(event.clone());
        }
    }

    struct Fixture {
        engine: Arc<StubEngine>,
        sink: Arc<RecordingSink>,
        coordinator: Arc<Coordinator>,
    }

    fn fixture_with(engine: StubEngine) -> Fixture {
        let engine = Arc::new(engine);
        let sink = Arc::new(RecordingSink::default());
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
        let coordinator = Arc::new(Coordinator::new(
            engine.clone(),
            Arc::new(UlidGenerator::new(clock.clone())),
            clock,
            vec![sink.clone() as Arc<dyn EventSink>],
        ));
        Fixture {
            engine,
            sink,
            coordinator,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(StubEngine::new())
    }

    fn positional(items: &[&str]) -> LaunchRequest {
        LaunchRequest::positional(items.iter().map(|s| s.to_string()).collect())
    }

    #[tokio::test]
    async fn reset_launches_and_installs_current() {
        let f = fixture();
        let outcome = f
            .coordinator
            .reset(&positional(&["/path/to/exec-id123", "--flag", "arg"]))
            .await
            .unwrap();

        assert!(outcome.is_new_launch());
        assert_eq!(outcome.instance().identity.as_str(), "exec-id123");
        assert_eq!(f.coordinator.state(), LifecycleState::Running);
        assert_eq!(f.engine.launches()[0].params.args, vec!["arg".to_string()]);
        assert!(matches!(
            f.sink.events.lock()[0],
            DomainEvent::Launched { .. }
        ));
    }

    #[tokio::test]
    async fn reset_with_current_identity_does_not_relaunch() {
        let f = fixture();
        let first = f.coordinator.reset(&positional(&["exec-id123"])).await.unwrap();
        let second = f.coordinator.reset(&positional(&["/other/exec-id123"])).await.unwrap();

        assert!(!second.is_new_launch());
        assert_eq!(first.instance().id, second.instance().id);
        assert_eq!(f.engine.launches().len(), 1);
    }

    #[tokio::test]
    async fn invalid_identity_has_no_side_effects() {
        let f = fixture();
        let err = f.coordinator.reset(&positional(&["/path/to/.hidden"])).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Identity);
        assert!(f.engine.launches().is_empty());
        assert!(f.sink.events.lock().is_empty());
        assert_eq!(f.coordinator.state(), LifecycleState::NoApp);
    }

    #[tokio::test]
    async fn failed_launch_leaves_no_app_and_keeps_old_instance() {
        let f = fixture();
        let old = f.coordinator.reset(&positional(&["first"])).await.unwrap();
        f.engine.refuse("second");

        let err = f.coordinator.reset(&positional(&["second"])).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Resolution);
        assert_eq!(f.coordinator.state(), LifecycleState::NoApp);
        assert!(f.coordinator.current().is_none());

        let old = f.coordinator.instance(old.instance().id).unwrap();
        assert_eq!(old.state, LifecycleState::Running);
        assert!(f.engine.last_application().unwrap().calls().is_empty());
    }

    #[tokio::test]
    async fn reset_to_new_identity_keeps_old_instance_alive() {
        let f = fixture();
        let old = f.coordinator.reset(&positional(&["first"])).await.unwrap();
        let new = f.coordinator.reset(&positional(&["second"])).await.unwrap();

        assert_ne!(old.instance().id, new.instance().id);
        assert_eq!(f.coordinator.current().unwrap().id, new.instance().id);
        assert!(f.coordinator.is_running(&old.instance().identity));
        assert_eq!(f.coordinator.status().counts.running, 2);
    }

    #[tokio::test]
    async fn pause_resume_terminate_follow_the_table() {
        let f = fixture();
        f.coordinator.reset(&positional(&["exec-id123"])).await.unwrap();

        let paused = f.coordinator.pause().await.unwrap();
        assert!(matches!(paused, TransitionOutcome::Applied { to: LifecycleState::Suspended, .. }));
        assert_eq!(f.coordinator.state(), LifecycleState::Suspended);

        let again = f.coordinator.pause().await.unwrap();
        assert!(matches!(again, TransitionOutcome::Unchanged { .. }));

        f.coordinator.resume().await.unwrap();
        assert_eq!(f.coordinator.state(), LifecycleState::Running);

        let terminated = f.coordinator.terminate().await;
        assert!(terminated.reached_target());
        assert_eq!(f.coordinator.state(), LifecycleState::Terminated);
        assert_eq!(
            f.engine.last_application().unwrap().calls(),
            vec![
                LifecycleCommand::Suspend,
                LifecycleCommand::Resume,
                LifecycleCommand::Terminate
            ]
        );
    }

    #[tokio::test]
    async fn events_without_instance_are_benign() {
        let f = fixture();
        assert_eq!(f.coordinator.pause().await.unwrap(), TransitionOutcome::NoInstance);
        assert_eq!(f.coordinator.resume().await.unwrap(), TransitionOutcome::NoInstance);
        assert_eq!(f.coordinator.terminate().await, TransitionOutcome::NoInstance);
        f.coordinator.create().await;
        f.coordinator.ignore(AppEvent::LowMemPost).await;
        assert_eq!(f.coordinator.state(), LifecycleState::NoApp);
    }

    #[tokio::test]
    async fn scoped_terminate_is_idempotent() {
        let f = fixture();
        let info = f.coordinator.reset(&positional(&["exec-id123"])).await.unwrap();
        let id = info.instance().id;

        assert!(f.coordinator.terminate_instance(id).await.reached_target());
        assert_eq!(f.coordinator.terminate_instance(id).await, TransitionOutcome::NoInstance);
        assert_eq!(f.engine.total_terminations(), 1);
    }

    #[tokio::test]
    async fn engine_terminate_error_still_destroys_instance() {
        let f = fixture();
        let info = f.coordinator.reset(&positional(&["exec-id123"])).await.unwrap();
        f.engine.last_application().unwrap().fail("terminate");

        f.coordinator.terminate().await;
        assert!(f.coordinator.instance(info.instance().id).is_none());
    }

    #[tokio::test]
    async fn engine_suspend_error_keeps_state() {
        let f = fixture();
        f.coordinator.reset(&positional(&["exec-id123"])).await.unwrap();
        f.engine.last_application().unwrap().fail("suspend");

        let err = f.coordinator.pause().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Engine);
        assert_eq!(f.coordinator.state(), LifecycleState::Running);
    }

    #[tokio::test]
    async fn hide_calls_the_engine_without_moving_state() {
        let f = fixture();
        let info = f.coordinator.reset(&positional(&["exec-id123"])).await.unwrap();
        let id = info.instance().id;

        assert!(f.coordinator.hide_instance(id).await.unwrap());
        f.coordinator.pause().await.unwrap();
        assert!(f.coordinator.hide_instance(id).await.unwrap());
        assert_eq!(f.coordinator.state(), LifecycleState::Suspended);
        assert_eq!(f.engine.last_application().unwrap().hides(), 2);
        // Hide はイベントを出さない
        assert_eq!(f.sink.events.lock().len(), 2);

        f.engine.last_application().unwrap().fail("hide");
        let err = f.coordinator.hide_instance(id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Engine);

        f.coordinator.terminate().await;
        assert!(!f.coordinator.hide_instance(id).await.unwrap());
    }

    #[tokio::test]
    async fn state_watch_sees_every_settled_state() {
        let f = fixture();
        let mut states = f.coordinator.watch_state();
        assert_eq!(*states.borrow_and_update(), LifecycleState::NoApp);

        f.coordinator.reset(&positional(&["exec-id123"])).await.unwrap();
        assert!(states.has_changed().unwrap());
        assert_eq!(*states.borrow_and_update(), LifecycleState::Running);

        f.coordinator.pause().await.unwrap();
        assert_eq!(*states.borrow_and_update(), LifecycleState::Suspended);

        f.coordinator.terminate().await;
        assert_eq!(*states.borrow_and_update(), LifecycleState::Terminated);

        // 変化のない呼び出しは通知しない
        f.coordinator.terminate().await;
        assert!(!states.has_changed().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn events_queue_behind_an_in_flight_reset() {
        let f = fixture_with(StubEngine::new().with_launch_delay(Duration::from_secs(1)));

        let coordinator = f.coordinator.clone();
        let reset = tokio::spawn(async move { coordinator.reset(&positional(&["exec-id123"])).await });
        tokio::task::yield_now().await;
        assert_eq!(f.coordinator.state(), LifecycleState::Launching);

        // Pause は Reset の完了を待ってから current に作用する
        let paused = f.coordinator.pause().await.unwrap();
        assert!(matches!(paused, TransitionOutcome::Applied { .. }));
        assert!(reset.await.unwrap().is_ok());
        assert_eq!(f.coordinator.state(), LifecycleState::Suspended);
    }
}
