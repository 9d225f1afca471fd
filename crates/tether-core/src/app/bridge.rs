//! PlatformEventBridge - ライフサイクルデーモンと Coordinator の橋渡し
//!
//! # 流れ
//! 1. コマンドラインから Reset 相当の launch を行う
//! 2. `<prefix>-<identity>` でデーモンに登録（`--` で始まる引数は渡さない）
//! 3. 登録が返すイベント受け口からイベントを 1 つずつ取り出し、
//!    1 イベント = 1 回の Coordinator 呼び出しに変換する
//!
//! 登録に失敗したら、起動したばかりのインスタンスを Terminate してから
//! エラーを返します。

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::coordinator::{Coordinator, LifecycleError, ResetOutcome};
use crate::config::TetherConfig;
use crate::domain::{AppEvent, ErrorKind, LaunchRequest, PlatformEvent, positional_args};
use crate::ports::{DaemonError, LifecycleDaemon, Registration};

#[derive(Debug, Clone, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Registration(#[from] DaemonError),
}

impl BridgeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::Lifecycle(err) => err.kind(),
            BridgeError::Registration(err) => err.kind(),
        }
    }
}

/// How a session's event loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    Terminated,
    DaemonClosed,
}

pub struct PlatformEventBridge {
    coordinator: Arc<Coordinator>,
    daemon: Arc<dyn LifecycleDaemon>,
    config: Arc<TetherConfig>,
}

impl PlatformEventBridge {
    pub fn new(
        coordinator: Arc<Coordinator>,
        daemon: Arc<dyn LifecycleDaemon>,
        config: Arc<TetherConfig>,
    ) -> Self {
        Self {
            coordinator,
            daemon,
            config,
        }
    }

    /// Launch from the process's own command line and register with the daemon.
    pub async fn launch_from_command_line(&self, argv: Vec<String>) -> Result<BridgeSession, BridgeError> {
        let request = LaunchRequest::positional(argv.clone());
        let outcome = self.coordinator.reset(&request).await?;
        let info = outcome.instance().clone();

        let name = self.config.registration_name(info.identity.as_str());
        let args = positional_args(&argv);
        match self.daemon.register(&name, &args).await {
            Ok(registration) => {
                info!(name = %name, instance = %info.id, "registered with lifecycle daemon");
                Ok(BridgeSession {
                    coordinator: self.coordinator.clone(),
                    registration,
                    argv,
                })
            }
            Err(err) => {
                error!(name = %name, error = %err, "daemon registration failed");
                if let ResetOutcome::Launched(info) = &outcome {
                    self.coordinator.terminate_instance(info.id).await;
                }
                Err(err.into())
            }
        }
    }
}

/// A registered process: its daemon event stream plus the command line that
/// Reset events are rebuilt from.
pub struct BridgeSession {
    coordinator: Arc<Coordinator>,
    registration: Registration,
    argv: Vec<String>,
}

impl BridgeSession {
    pub fn registration_name(&self) -> &str {
        self.registration.name()
    }

    /// Process events in delivery order until Terminate or daemon hang-up.
    pub async fn run(mut self) -> SessionEnd {
        while let Some(event) = self.registration.next_event().await {
            let terminate = event.event == AppEvent::Terminate;
            if let Err(err) = self.dispatch(event).await {
                warn!(error = %err, kind = %err.kind(), "platform event failed");
            }
            if terminate {
                return SessionEnd::Terminated;
            }
        }
        debug!("lifecycle daemon closed the event stream");
        SessionEnd::DaemonClosed
    }

    pub async fn dispatch(&self, event: PlatformEvent) -> Result<(), LifecycleError> {
        debug!(event = %event.event, "platform event");
        match event.event {
            AppEvent::Create => self.coordinator.create().await,
            AppEvent::Reset => {
                let request = LaunchRequest::from_invocation(self.argv.clone(), event.bundle);
                self.coordinator.reset(&request).await?;
            }
            AppEvent::Terminate => {
                self.coordinator.terminate().await;
            }
            AppEvent::Pause => {
                self.coordinator.pause().await?;
            }
            AppEvent::Resume => {
                self.coordinator.resume().await?;
            }
            AppEvent::LowMemPost | AppEvent::MemFlush | AppEvent::Unknown => {
                self.coordinator.ignore(event.event).await
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Bundle;
    use crate::domain::LifecycleState;
    use crate::impls::{InMemoryDaemon, StubEngine};
    use crate::ports::{SystemClock, UlidGenerator};

    struct Fixture {
        engine: Arc<StubEngine>,
        daemon: Arc<InMemoryDaemon>,
        coordinator: Arc<Coordinator>,
        bridge: PlatformEventBridge,
    }

    fn fixture() -> Fixture {
        let engine = Arc::new(StubEngine::new());
        let daemon = Arc::new(InMemoryDaemon::new());
        let coordinator = Arc::new(Coordinator::new(
            engine.clone(),
            Arc::new(UlidGenerator::new(SystemClock)),
            Arc::new(SystemClock),
            Vec::new(),
        ));
        let bridge = PlatformEventBridge::new(
            coordinator.clone(),
            daemon.clone(),
            Arc::new(TetherConfig::default()),
        );
        Fixture {
            engine,
            daemon,
            coordinator,
            bridge,
        }
    }

    fn argv(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn registers_with_prefixed_name_and_filtered_args() {
        let f = fixture();
        let session = f
            .bridge
            .launch_from_command_line(argv(&["/path/to/exec-id123", "--verbose", "page"]))
            .await
            .unwrap();

        assert_eq!(session.registration_name(), "tether-exec-id123");
        let records = f.daemon.registrations();
        assert_eq!(records[0].args, argv(&["/path/to/exec-id123", "page"]));
        assert_eq!(f.coordinator.state(), LifecycleState::Running);
    }

    #[tokio::test]
    async fn registration_failure_terminates_the_instance() {
        let f = fixture();
        f.daemon.fail_registration("daemon offline");

        let err = f
            .bridge
            .launch_from_command_line(argv(&["/path/to/exec-id123"]))
            .await
            .err()
            .unwrap();

        assert_eq!(err.kind(), ErrorKind::Registration);
        assert_eq!(f.engine.total_terminations(), 1);
        assert_eq!(f.coordinator.state(), LifecycleState::Terminated);
    }

    #[tokio::test]
    async fn session_maps_events_until_terminate() {
        let f = fixture();
        let session = f
            .bridge
            .launch_from_command_line(argv(&["exec-id123"]))
            .await
            .unwrap();

        f.daemon.deliver(PlatformEvent::new(AppEvent::Create));
        f.daemon.deliver(PlatformEvent::new(AppEvent::Pause));
        f.daemon.deliver(PlatformEvent::new(AppEvent::LowMemPost));
        f.daemon.deliver(PlatformEvent::new(AppEvent::Resume));
        f.daemon.deliver(PlatformEvent::new(AppEvent::Terminate));
        f.daemon.deliver(PlatformEvent::new(AppEvent::Pause));

        assert_eq!(session.run().await, SessionEnd::Terminated);
        assert_eq!(f.coordinator.state(), LifecycleState::Terminated);
        assert_eq!(f.engine.last_application().unwrap().calls().len(), 3);
    }

    #[tokio::test]
    async fn reset_event_carries_the_bundle() {
        let f = fixture();
        let session = f
            .bridge
            .launch_from_command_line(argv(&["/path/to/exec-id123"]))
            .await
            .unwrap();
        session
            .dispatch(PlatformEvent::new(AppEvent::Terminate))
            .await
            .unwrap();

        let bundle = Bundle::new().with_operation("VIEW").with_uri("http://example");
        session
            .dispatch(PlatformEvent::reset(Some(bundle.clone())))
            .await
            .unwrap();

        let launches = f.engine.launches();
        assert_eq!(launches.len(), 2);
        assert_eq!(launches[1].identity.as_str(), "exec-id123");
        assert_eq!(launches[1].params.bundle, Some(bundle));
        assert_eq!(f.coordinator.state(), LifecycleState::Running);
    }

    #[tokio::test]
    async fn daemon_hang_up_ends_the_session() {
        let f = fixture();
        let session = f
            .bridge
            .launch_from_command_line(argv(&["exec-id123"]))
            .await
            .unwrap();
        f.daemon.hang_up();

        assert_eq!(session.run().await, SessionEnd::DaemonClosed);
        assert_eq!(f.coordinator.state(), LifecycleState::Running);
    }
}
