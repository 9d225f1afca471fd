//! Launcher - 1 回の起動要求のためのプロセス
//!
//! # 流れ
//! 1. 自プロセスとしてデーモンに登録（`<prefix>-<target>`）
//! 2. target が URL でなければ exec path を引き、プロセス名を書き換える
//! 3. デーモンのイベントを待つ
//!    - Reset: bundle が app-control ならエンコードして、そうでなければそのまま
//!      ランタイムの `/running` に `Launch` を送る
//!    - Pause / Resume: 自分の制御オブジェクトに Suspend / Resume を送る
//!    - Terminate: ループを抜ける（接続が切れるとランタイム側が Terminate する）
//!
//! 終了コードは成功 0、登録失敗・起動失敗は 1。

use std::ops::ControlFlow;
use std::process::ExitCode;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::codec::{Bundle, EncodedBundle};
use crate::config::TetherConfig;
use crate::domain::{
    AppEvent, ApplicationIdentity, ErrorKind, Failure, IdentityError, PlatformEvent,
    positional_args,
};
use crate::ports::{
    BusError, ControlBus, DaemonError, LifecycleDaemon, ObjectPath, PackageError,
    PackageResolver, ProcessTitle, Registration, Request, TitleError,
};

#[derive(Debug, Error)]
pub enum LauncherError {
    #[error(transparent)]
    Registration(#[from] DaemonError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Package(#[from] PackageError),

    #[error("failed to rewrite process title: {0}")]
    Title(#[from] TitleError),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error("runtime replied with {0}")]
    Remote(#[from] Failure),

    #[error("no application has been launched yet")]
    NotLaunched,
}

impl LauncherError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LauncherError::Registration(err) => err.kind(),
            LauncherError::Identity(err) => err.kind(),
            LauncherError::Package(err) => err.kind(),
            LauncherError::Title(_) => ErrorKind::Resolution,
            LauncherError::Bus(err) => err.kind(),
            LauncherError::Remote(failure) => failure.kind,
            LauncherError::NotLaunched => ErrorKind::Protocol,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LauncherExit {
    Success,
    Failure,
}

impl LauncherExit {
    pub fn code(self) -> u8 {
        match self {
            LauncherExit::Success => 0,
            LauncherExit::Failure => 1,
        }
    }
}

impl From<LauncherExit> for ExitCode {
    fn from(exit: LauncherExit) -> Self {
        ExitCode::from(exit.code())
    }
}

/// URL を直接開く起動かどうか
pub fn is_url_target(target: &str) -> bool {
    Url::parse(target).is_ok()
}

pub struct LauncherShim<T> {
    config: Arc<TetherConfig>,
    daemon: Arc<dyn LifecycleDaemon>,
    bus: Arc<dyn ControlBus>,
    packages: Arc<dyn PackageResolver>,
    title: T,
    control: Option<ObjectPath>,
}

impl<T: ProcessTitle> LauncherShim<T> {
    pub fn new(
        config: Arc<TetherConfig>,
        daemon: Arc<dyn LifecycleDaemon>,
        bus: Arc<dyn ControlBus>,
        packages: Arc<dyn PackageResolver>,
        title: T,
    ) -> Self {
        Self {
            config,
            daemon,
            bus,
            packages,
            title,
            control: None,
        }
    }

    pub fn title(&self) -> &T {
        &self.title
    }

    /// Path of the control object the runtime exported for us.
    pub fn control_path(&self) -> Option<&ObjectPath> {
        self.control.as_ref()
    }

    /// Run one launch attempt for `target`. `args` is the launcher's own
    /// command line, passed on to the daemon with runtime flags removed.
    pub async fn run(&mut self, target: &str, args: &[String]) -> LauncherExit {
        let mut registration = match self.start(target, args).await {
            Ok(registration) => registration,
            Err(err) => {
                error!(target, error = %err, kind = %err.kind(), "launcher start failed");
                return LauncherExit::Failure;
            }
        };

        while let Some(event) = registration.next_event().await {
            if let ControlFlow::Break(exit) = self.on_event(target, event).await {
                return exit;
            }
        }
        debug!("lifecycle daemon closed the event stream");
        LauncherExit::Success
    }

    /// `--query`: ask the runtime whether `app_id` is running.
    pub async fn query_running(&self, app_id: &str) -> Result<bool, LauncherError> {
        let reply = self
            .bus
            .call(
                &self.config.runtime_bus_name(),
                &ObjectPath::manager(),
                Request::IsApplicationRunning {
                    app_id: app_id.to_owned(),
                },
            )
            .await?;
        Ok(reply.into_bool()?)
    }

    async fn start(&mut self, target: &str, args: &[String]) -> Result<Registration, LauncherError> {
        let name = self.config.registration_name(target);
        let registration = self.daemon.register(&name, &positional_args(args)).await?;
        info!(name = %name, "launcher registered");

        if is_url_target(target) {
            debug!(target, "url target; keeping process title");
        } else {
            self.rewrite_title(target)?;
        }
        Ok(registration)
    }

    fn rewrite_title(&mut self, target: &str) -> Result<(), LauncherError> {
        let identity = ApplicationIdentity::resolve(target)?;
        let exec = self.packages.exec_path(&identity)?;
        let exec = exec.to_string_lossy();
        let update = self.title.set_visible_identity(&exec)?;
        if update.truncated {
            warn!(
                exec = %exec,
                capacity = self.title.capacity(),
                "exec path truncated in process title"
            );
        }
        Ok(())
    }

    async fn on_event(&mut self, target: &str, event: PlatformEvent) -> ControlFlow<LauncherExit> {
        info!(event = %event.event, "launcher event");
        match event.event {
            AppEvent::Terminate => return ControlFlow::Break(LauncherExit::Success),
            AppEvent::Pause => {
                if let Err(err) = self.forward(Request::Suspend).await {
                    error!(error = %err, "suspending application failed");
                }
            }
            AppEvent::Resume => {
                if let Err(err) = self.forward(Request::Resume).await {
                    error!(error = %err, "resuming application failed");
                }
            }
            AppEvent::Reset => {
                let encoded = event
                    .bundle
                    .filter(Bundle::is_app_control)
                    .map(|bundle| bundle.encode());
                match self.launch(target, encoded).await {
                    Ok(path) => {
                        info!(path = %path, "application launched");
                        self.control = Some(path);
                    }
                    Err(err) => {
                        error!(target, error = %err, "launch failed");
                        return ControlFlow::Break(LauncherExit::Failure);
                    }
                }
            }
            AppEvent::Unknown | AppEvent::Create | AppEvent::LowMemPost | AppEvent::MemFlush => {}
        }
        ControlFlow::Continue(())
    }

    async fn launch(
        &self,
        target: &str,
        encoded_bundle: Option<EncodedBundle>,
    ) -> Result<ObjectPath, LauncherError> {
        let reply = self
            .bus
            .call(
                &self.config.runtime_bus_name(),
                &ObjectPath::manager(),
                Request::Launch {
                    app_id: target.to_owned(),
                    encoded_bundle,
                },
            )
            .await?;
        Ok(reply.into_path()?)
    }

    async fn forward(&self, request: Request) -> Result<(), LauncherError> {
        let path = self.control.as_ref().ok_or(LauncherError::NotLaunched)?;
        let method = request.method_name();
        let reply = self
            .bus
            .call(&self.config.runtime_bus_name(), path, request)
            .await?;
        if !reply.into_bool()? {
            warn!(method, path = %path, "runtime did not apply the request");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{Runtime, RuntimeBuilder};
    use crate::domain::LifecycleState;
    use crate::impls::{
        ArgvBuffer, BusConnection, InMemoryBus, InMemoryDaemon, InMemoryPackageDb, StubEngine,
    };
    use rstest::rstest;

    struct Fixture {
        engine: Arc<StubEngine>,
        runtime: Runtime,
        daemon: Arc<InMemoryDaemon>,
        shim: LauncherShim<ArgvBuffer>,
    }

    async fn fixture(packages: InMemoryPackageDb) -> Fixture {
        let bus = InMemoryBus::new();
        let engine = Arc::new(StubEngine::new());
        let runtime = RuntimeBuilder::new()
            .bus(Arc::new(bus.connect()))
            .daemon(Arc::new(InMemoryDaemon::new()))
            .engine(engine.clone())
            .network(engine.clone())
            .build()
            .unwrap();
        runtime.serve().await.unwrap();

        let daemon = Arc::new(InMemoryDaemon::new());
        let connection: Arc<BusConnection> = Arc::new(bus.connect());
        let shim = LauncherShim::new(
            Arc::new(TetherConfig::default()),
            daemon.clone(),
            connection,
            Arc::new(packages),
            ArgvBuffer::from_args(["tether-launcher", "exec-id123", "--fullscreen"]),
        );
        Fixture {
            engine,
            runtime,
            daemon,
            shim,
        }
    }

    fn packages() -> InMemoryPackageDb {
        InMemoryPackageDb::new().with_global_package("exec-id123", "/usr/apps/exec-id123/bin/exec-id123")
    }

    fn args() -> Vec<String> {
        vec!["exec-id123".into(), "--fullscreen".into()]
    }

    #[rstest]
    #[case("http://example.com/index.html", true)]
    #[case("file:///opt/app/index.html", true)]
    #[case("exec-id123", false)]
    #[case("abcdefghij.App", false)]
    #[case("/usr/apps/exec-id123", false)]
    fn classifies_url_targets(#[case] target: &str, #[case] expected: bool) {
        assert_eq!(is_url_target(target), expected);
    }

    #[tokio::test]
    async fn plain_reset_launches_and_terminate_exits_cleanly() {
        let mut f = fixture(packages()).await;
        f.daemon.deliver(PlatformEvent::reset(None));
        f.daemon.deliver(PlatformEvent::new(AppEvent::Terminate));

        let exit = f.shim.run("exec-id123", &args()).await;

        assert_eq!(exit, LauncherExit::Success);
        assert_eq!(exit.code(), 0);
        assert_eq!(f.daemon.registrations()[0].name, "tether-exec-id123");
        assert_eq!(f.daemon.registrations()[0].args, vec!["exec-id123".to_string()]);
        assert_eq!(f.shim.title().visible(), "/usr/apps/exec-id123/bin/exec-id123");
        assert_eq!(
            f.shim.control_path().map(ObjectPath::as_str),
            Some("/running/exec_2did123")
        );
        assert_eq!(f.runtime.coordinator().state(), LifecycleState::Running);
    }

    #[tokio::test]
    async fn pause_and_resume_are_forwarded() {
        let mut f = fixture(packages()).await;
        f.daemon.deliver(PlatformEvent::reset(None));
        f.daemon.deliver(PlatformEvent::new(AppEvent::Pause));
        f.daemon.hang_up();

        assert_eq!(f.shim.run("exec-id123", &args()).await, LauncherExit::Success);
        assert_eq!(f.runtime.coordinator().state(), LifecycleState::Suspended);
    }

    #[tokio::test]
    async fn registration_failure_exits_with_one() {
        let mut f = fixture(packages()).await;
        f.daemon.fail_registration("denied");

        let exit = f.shim.run("exec-id123", &args()).await;
        assert_eq!(exit.code(), 1);
        assert!(f.engine.launches().is_empty());
    }

    #[tokio::test]
    async fn unknown_package_exits_with_one() {
        let mut f = fixture(InMemoryPackageDb::new()).await;
        f.daemon.deliver(PlatformEvent::reset(None));

        assert_eq!(f.shim.run("exec-id123", &args()).await, LauncherExit::Failure);
        assert!(f.engine.launches().is_empty());
    }

    #[tokio::test]
    async fn url_target_skips_the_title_rewrite() {
        let mut f = fixture(InMemoryPackageDb::new()).await;
        f.daemon.deliver(PlatformEvent::new(AppEvent::Terminate));

        let exit = f.shim.run("http://example.com/app", &args()).await;
        assert_eq!(exit, LauncherExit::Success);
        assert_eq!(f.shim.title().visible(), "tether-launcher");
    }

    #[tokio::test]
    async fn refused_launch_exits_with_one() {
        let mut f = fixture(packages()).await;
        f.engine.refuse("exec-id123");
        f.daemon.deliver(PlatformEvent::reset(None));
        f.daemon.deliver(PlatformEvent::new(AppEvent::Terminate));

        assert_eq!(f.shim.run("exec-id123", &args()).await, LauncherExit::Failure);
        assert!(f.shim.control_path().is_none());
    }

    #[tokio::test]
    async fn query_reports_running_state() {
        let mut f = fixture(packages()).await;
        assert!(!f.shim.query_running("exec-id123").await.unwrap());

        f.daemon.deliver(PlatformEvent::reset(None));
        f.daemon.hang_up();
        f.shim.run("exec-id123", &args()).await;

        assert!(f.shim.query_running("exec-id123").await.unwrap());
        let err = f.shim.query_running("-bad").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Identity);
    }
}
