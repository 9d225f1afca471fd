//! RuntimeBuilder - ランタイムの構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）: 足りない部品はまとめて報告する
//! - sink の順序: ログ → 追加の sink → ControlRegistry（片付けは最後）

use std::sync::Arc;

use thiserror::Error;

use super::control::ControlTimeouts;
use super::coordinator::Coordinator;
use super::io_context::IoContext;
use super::registry::ControlRegistry;
use super::runtime::Runtime;
use crate::config::{ConfigError, TetherConfig};
use crate::impls::TracingEventSink;
use crate::ports::{
    ApplicationService, Clock, ControlBus, EventSink, IdGenerator, LifecycleDaemon,
    NetworkContext, SystemClock, UlidGenerator,
};

/// BuildError はランタイム構築時のエラー
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Missing components: {0:?}. These collaborators must be provided before build().")]
    MissingComponents(Vec<&'static str>),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to start the engine I/O thread: {0}")]
    IoThread(#[from] std::io::Error),
}

/// RuntimeBuilder はランタイムを構築
///
/// # 使用例
/// ```ignore
/// let runtime = RuntimeBuilder::new()
///     .bus(Arc::new(bus.connect()))
///     .daemon(daemon)
///     .engine(engine.clone())
///     .network(engine)
///     .build()?;
/// ```
#[derive(Default)]
pub struct RuntimeBuilder {
    config: TetherConfig,
    bus: Option<Arc<dyn ControlBus>>,
    daemon: Option<Arc<dyn LifecycleDaemon>>,
    engine: Option<Arc<dyn ApplicationService>>,
    network: Option<Arc<dyn NetworkContext>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    sinks: Vec<Arc<dyn EventSink>>,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: TetherConfig) -> Self {
        self.config = config;
        self
    }

    pub fn bus(mut self, bus: Arc<dyn ControlBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn daemon(mut self, daemon: Arc<dyn LifecycleDaemon>) -> Self {
        self.daemon = Some(daemon);
        self
    }

    pub fn engine(mut self, engine: Arc<dyn ApplicationService>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn network(mut self, network: Arc<dyn NetworkContext>) -> Self {
        self.network = Some(network);
        self
    }

    /// Defaults to `SystemClock`.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Defaults to a `UlidGenerator` over the clock.
    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// # 検証
    /// - bus / daemon / engine / network が揃っているか
    /// - 不足があれば BuildError::MissingComponents で全部並べて返す
    pub fn build(self) -> Result<Runtime, BuildError> {
        self.config.validate()?;

        let mut missing = Vec::new();
        if self.bus.is_none() {
            missing.push("bus");
        }
        if self.daemon.is_none() {
            missing.push("daemon");
        }
        if self.engine.is_none() {
            missing.push("engine");
        }
        if self.network.is_none() {
            missing.push("network");
        }
        let (Some(bus), Some(daemon), Some(engine), Some(network)) =
            (self.bus, self.daemon, self.engine, self.network)
        else {
            return Err(BuildError::MissingComponents(missing));
        };

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(clock.clone())));

        let io = Arc::new(IoContext::spawn(network)?);
        let registry = Arc::new(ControlRegistry::new(
            bus.clone(),
            io,
            ControlTimeouts {
                io_handoff: self.config.io_handoff_timeout(),
                channel_wait: self.config.channel_wait_timeout(),
            },
        ));

        let mut sinks: Vec<Arc<dyn EventSink>> = vec![Arc::new(TracingEventSink)];
        sinks.extend(self.sinks);
        sinks.push(registry.clone());

        let coordinator = Arc::new(Coordinator::new(engine, ids, clock, sinks));

        Ok(Runtime {
            config: Arc::new(self.config),
            coordinator,
            registry,
            bus,
            daemon,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::{InMemoryBus, InMemoryDaemon, StubEngine};

    #[test]
    fn test_build_success() {
        let engine = Arc::new(StubEngine::new());
        let runtime = RuntimeBuilder::new()
            .bus(Arc::new(InMemoryBus::new().connect()))
            .daemon(Arc::new(InMemoryDaemon::new()))
            .engine(engine.clone())
            .network(engine)
            .build();
        assert!(runtime.is_ok());
    }

    #[test]
    fn test_build_missing_components() {
        let runtime = RuntimeBuilder::new()
            .daemon(Arc::new(InMemoryDaemon::new()))
            .build();
        assert!(matches!(
            runtime,
            Err(BuildError::MissingComponents(ref missing)) if missing == &vec!["bus", "engine", "network"]
        ));
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let engine = Arc::new(StubEngine::new());
        let config = TetherConfig {
            io_handoff_timeout_ms: 0,
            ..TetherConfig::default()
        };
        let runtime = RuntimeBuilder::new()
            .config(config)
            .bus(Arc::new(InMemoryBus::new().connect()))
            .daemon(Arc::new(InMemoryDaemon::new()))
            .engine(engine.clone())
            .network(engine)
            .build();
        assert!(matches!(runtime, Err(BuildError::Config(_))));
    }
}
