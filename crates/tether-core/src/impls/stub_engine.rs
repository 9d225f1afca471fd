//! StubEngine - ブラウザエンジンの代役
//!
//! ApplicationService / NetworkContext を実装し、呼ばれた内容を記録します。
//! パッケージ DB を渡すと、launch 時に exec path を引いて
//! 見つからなければ `EngineError::LaunchFailed` を返します。

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::domain::{ApplicationIdentity, LaunchParams, LifecycleCommand};
use crate::ports::{Application, ApplicationService, EngineError, NetworkContext, PackageResolver};

/// 記録された launch
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchRecord {
    pub identity: ApplicationIdentity,
    pub params: LaunchParams,
}

#[derive(Default)]
struct EngineState {
    launches: Vec<LaunchRecord>,
    applications: Vec<Arc<StubApplication>>,
    refused: HashSet<String>,
    user_agent: Option<String>,
    cookie_clears: usize,
}

#[derive(Default)]
pub struct StubEngine {
    packages: Option<Arc<dyn PackageResolver>>,
    launch_delay: Option<Duration>,
    io_delay: Option<Duration>,
    state: Mutex<EngineState>,
}

impl StubEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_packages(mut self, packages: Arc<dyn PackageResolver>) -> Self {
        self.packages = Some(packages);
        self
    }

    /// launch が完了するまでの待ち時間（tokio の時計）
    pub fn with_launch_delay(mut self, delay: Duration) -> Self {
        self.launch_delay = Some(delay);
        self
    }

    /// I/O スレッド上の操作にかかる時間（実時間）
    pub fn with_io_delay(mut self, delay: Duration) -> Self {
        self.io_delay = Some(delay);
        self
    }

    /// `identity` の launch を失敗させる
    pub fn refuse(&self, identity: &str) {
        self.state.lock().refused.insert(identity.to_owned());
    }

    pub fn launches(&self) -> Vec<LaunchRecord> {
        self.state.lock().launches.clone()
    }

    pub fn applications(&self) -> Vec<Arc<StubApplication>> {
        self.state.lock().applications.clone()
    }

    pub fn last_application(&self) -> Option<Arc<StubApplication>> {
        self.state.lock().applications.last().cloned()
    }

    pub fn user_agent(&self) -> Option<String> {
        self.state.lock().user_agent.clone()
    }

    pub fn cookie_clears(&self) -> usize {
        self.state.lock().cookie_clears
    }

    /// 全アプリケーションに対する terminate の合計
    pub fn total_terminations(&self) -> usize {
        self.applications()
            .iter()
            .map(|app| app.terminations())
            .sum()
    }
}

#[async_trait]
impl ApplicationService for StubEngine {
    async fn launch(
        &self,
        identity: &ApplicationIdentity,
        params: &LaunchParams,
    ) -> Result<Arc<dyn Application>, EngineError> {
        if let Some(delay) = self.launch_delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(packages) = &self.packages {
            packages
                .exec_path(identity)
                .map_err(|err| EngineError::LaunchFailed {
                    identity: identity.clone(),
                    reason: err.to_string(),
                })?;
        }

        let mut state = self.state.lock();
        state.launches.push(LaunchRecord {
            identity: identity.clone(),
            params: params.clone(),
        });
        if state.refused.contains(identity.as_str()) {
            return Err(EngineError::LaunchFailed {
                identity: identity.clone(),
                reason: "engine refused the launch".into(),
            });
        }

        let app = Arc::new(StubApplication::new(identity.clone()));
        state.applications.push(app.clone());
        debug!(identity = %identity, "stub application created");
        Ok(app)
    }
}

impl NetworkContext for StubEngine {
    fn set_user_agent(&self, value: &str) {
        if let Some(delay) = self.io_delay {
            std::thread::sleep(delay);
        }
        self.state.lock().user_agent = Some(value.to_owned());
    }

    fn remove_all_cookies(&self) {
        if let Some(delay) = self.io_delay {
            std::thread::sleep(delay);
        }
        self.state.lock().cookie_clears += 1;
    }
}

/// StubApplication は受けた lifecycle 操作を記録する
pub struct StubApplication {
    identity: ApplicationIdentity,
    calls: Mutex<Vec<LifecycleCommand>>,
    failing: Mutex<HashSet<&'static str>>,
}

impl StubApplication {
    fn new(identity: ApplicationIdentity) -> Self {
        Self {
            identity,
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
        }
    }

    pub fn identity(&self) -> &ApplicationIdentity {
        &self.identity
    }

    pub fn calls(&self) -> Vec<LifecycleCommand> {
        self.calls.lock().clone()
    }

    pub fn terminations(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| **call == LifecycleCommand::Terminate)
            .count()
    }

    pub fn hides(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| **call == LifecycleCommand::Hide)
            .count()
    }

    /// `operation`（"suspend" / "resume" / "terminate" / "hide"）を失敗させる
    pub fn fail(&self, operation: &'static str) {
        self.failing.lock().insert(operation);
    }

    fn record(&self, command: LifecycleCommand, operation: &'static str) -> Result<(), EngineError> {
        self.calls.lock().push(command);
        if self.failing.lock().contains(operation) {
            return Err(EngineError::Rejected {
                operation,
                reason: format!("{} refused {operation}", self.identity),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Application for StubApplication {
    async fn suspend(&self) -> Result<(), EngineError> {
        self.record(LifecycleCommand::Suspend, "suspend")
    }

    async fn resume(&self) -> Result<(), EngineError> {
        self.record(LifecycleCommand::Resume, "resume")
    }

    async fn terminate(&self) -> Result<(), EngineError> {
        self.record(LifecycleCommand::Terminate, "terminate")
    }

    async fn hide(&self) -> Result<(), EngineError> {
        self.record(LifecycleCommand::Hide, "hide")
    }
}
