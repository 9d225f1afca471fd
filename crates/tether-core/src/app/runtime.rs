//! Runtime - ランタイムプロセスの表面
//!
//! RuntimeBuilder で組み立てたコンポーネントを束ね、
//! バスへの公開（`serve`）とデーモン側の入口（`bridge`）を提供します。
//! ランタイムプロセスの main は `run` を呼ぶだけでよい。

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use super::bridge::{BridgeError, PlatformEventBridge, SessionEnd};
use super::coordinator::Coordinator;
use super::manager::LaunchManager;
use super::registry::ControlRegistry;
use super::status::StatusView;
use crate::config::TetherConfig;
use crate::domain::ErrorKind;
use crate::ports::{BusError, ControlBus, LifecycleDaemon, ObjectPath};

#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

impl RuntimeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RuntimeError::Bus(err) => err.kind(),
            RuntimeError::Bridge(err) => err.kind(),
        }
    }
}

pub struct Runtime {
    pub(crate) config: Arc<TetherConfig>,
    pub(crate) coordinator: Arc<Coordinator>,
    pub(crate) registry: Arc<ControlRegistry>,
    pub(crate) bus: Arc<dyn ControlBus>,
    pub(crate) daemon: Arc<dyn LifecycleDaemon>,
}

impl Runtime {
    /// Claim the runtime bus name and export the launch manager at `/running`.
    pub async fn serve(&self) -> Result<(), BusError> {
        let name = self.config.runtime_bus_name();
        self.bus.request_name(&name).await?;
        self.bus
            .export(
                ObjectPath::manager(),
                Arc::new(LaunchManager::new(
                    self.coordinator.clone(),
                    self.registry.clone(),
                )),
            )
            .await?;
        info!(name = %name, unique = %self.bus.unique_name(), "runtime serving");
        Ok(())
    }

    /// Entry point for a runtime launched directly by the daemon.
    pub fn bridge(&self) -> PlatformEventBridge {
        PlatformEventBridge::new(
            self.coordinator.clone(),
            self.daemon.clone(),
            self.config.clone(),
        )
    }

    /// Runtime process main loop: serve, launch from `argv`, then consume
    /// daemon events until Terminate or hang-up.
    pub async fn run(&self, argv: Vec<String>) -> Result<SessionEnd, RuntimeError> {
        self.serve().await?;
        let session = self.bridge().launch_from_command_line(argv).await?;
        info!(registration = session.registration_name(), "runtime session started");
        let end = session.run().await;
        info!(end = ?end, status = ?self.status(), "runtime session ended");
        Ok(end)
    }

    pub fn config(&self) -> &TetherConfig {
        &self.config
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    pub fn registry(&self) -> &Arc<ControlRegistry> {
        &self.registry
    }

    pub fn status(&self) -> StatusView {
        self.coordinator.status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::RuntimeBuilder;
    use crate::domain::{AppEvent, LifecycleState, PlatformEvent};
    use crate::impls::{InMemoryBus, InMemoryDaemon, StubEngine};

    struct Fixture {
        bus: InMemoryBus,
        daemon: Arc<InMemoryDaemon>,
        engine: Arc<StubEngine>,
        runtime: Runtime,
    }

    fn fixture() -> Fixture {
        let bus = InMemoryBus::new();
        let daemon = Arc::new(InMemoryDaemon::new());
        let engine = Arc::new(StubEngine::new());
        let runtime = RuntimeBuilder::new()
            .bus(Arc::new(bus.connect()))
            .daemon(daemon.clone())
            .engine(engine.clone())
            .network(engine.clone())
            .build()
            .unwrap();
        Fixture {
            bus,
            daemon,
            engine,
            runtime,
        }
    }

    fn argv(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn run_serves_and_ends_on_terminate() {
        let f = fixture();
        f.daemon.deliver(PlatformEvent::new(AppEvent::Terminate));

        let end = f.runtime.run(argv(&["/path/to/exec-id123"])).await.unwrap();

        assert_eq!(end, SessionEnd::Terminated);
        assert!(f.bus.is_exported(
            &f.runtime.config().runtime_bus_name(),
            &ObjectPath::manager()
        ));
        assert_eq!(f.engine.total_terminations(), 1);
        assert_eq!(f.runtime.coordinator().state(), LifecycleState::Terminated);
    }

    #[tokio::test]
    async fn run_reports_registration_failure() {
        let f = fixture();
        f.daemon.fail_registration("appcore init failed");

        let err = f.runtime.run(argv(&["/path/to/exec-id123"])).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Registration);
        assert_eq!(f.engine.total_terminations(), 1);
    }

    #[tokio::test]
    async fn run_fails_when_the_bus_name_is_taken() {
        let f = fixture();
        let squatter = f.bus.connect();
        squatter
            .request_name(&f.runtime.config().runtime_bus_name())
            .await
            .unwrap();

        let err = f.runtime.run(argv(&["exec-id123"])).await.unwrap_err();

        assert!(matches!(err, RuntimeError::Bus(BusError::NameTaken(_))));
        assert!(f.engine.launches().is_empty());
    }
}
