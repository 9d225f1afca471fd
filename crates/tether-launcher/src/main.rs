//! tether-launcher
//!
//! 1 回の起動要求を処理するランチャー。ここではランタイム・デーモン・エンジンを
//! プロセス内の実装（InMemoryBus / InMemoryDaemon / StubEngine）で組み立て、
//! 標準入力の行をデーモンのイベントとして流します。
//!
//! ```text
//! tether-launcher <app_id|url> [args...]
//! tether-launcher --query <app_id>
//! tether-launcher --runtime <exec-path> [args...]
//! ```
//!
//! `--runtime` はデーモンから直接起動されたランタイムプロセスとして動く。
//!
//! 標準入力: `pause` / `resume` / `terminate` / `reset [uri]`、EOF で terminate。

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use tether_core::app::{BuildError, Runtime, RuntimeBuilder, RuntimeError, SessionEnd};
use tether_core::codec::Bundle;
use tether_core::config::TetherConfig;
use tether_core::domain::{AppEvent, ApplicationIdentity, PlatformEvent};
use tether_core::impls::{InMemoryBus, InMemoryDaemon, InMemoryPackageDb, StubEngine};
use tether_core::launcher::{LauncherExit, LauncherShim};
use tether_core::ports::ProcessTitle;

/// ランチャー終了後、ランタイムが owner 消失を処理し終えるまでの上限
const SHUTDOWN_WAIT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
enum Mode {
    Launch { target: String },
    Query { target: String },
    Runtime { argv: Vec<String> },
}

fn parse_mode(args: &[String]) -> Option<Mode> {
    match args.get(1).map(String::as_str)? {
        "--query" => Some(Mode::Query {
            target: args.get(2)?.clone(),
        }),
        "--runtime" if args.len() > 2 => Some(Mode::Runtime {
            argv: args[2..].to_vec(),
        }),
        "--runtime" => None,
        target => Some(Mode::Launch {
            target: target.to_owned(),
        }),
    }
}

#[cfg(target_os = "linux")]
fn process_title(args: &[String]) -> impl ProcessTitle {
    tether_core::impls::SystemProcessTitle::from_args(args)
}

#[cfg(not(target_os = "linux"))]
fn process_title(args: &[String]) -> impl ProcessTitle {
    tether_core::impls::ArgvBuffer::from_args(args)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn parse_event(line: &str) -> Option<PlatformEvent> {
    let mut words = line.split_whitespace();
    let event = match words.next()? {
        "pause" => PlatformEvent::new(AppEvent::Pause),
        "resume" => PlatformEvent::new(AppEvent::Resume),
        "terminate" => PlatformEvent::new(AppEvent::Terminate),
        "reset" => PlatformEvent::reset(
            words
                .next()
                .map(|uri| Bundle::new().with_operation("VIEW").with_uri(uri)),
        ),
        _ => return None,
    };
    Some(event)
}

/// デモ用パッケージ DB: 起動対象だけを登録しておく
fn demo_packages(target: &str) -> InMemoryPackageDb {
    match ApplicationIdentity::resolve(target) {
        Ok(identity) => {
            let exec = format!("/usr/apps/{identity}/bin/{identity}");
            InMemoryPackageDb::new().with_global_package(identity.as_str(), exec)
        }
        Err(_) => InMemoryPackageDb::new(),
    }
}

fn build_runtime(
    config: &TetherConfig,
    bus: &InMemoryBus,
    daemon: Arc<InMemoryDaemon>,
    packages: Arc<InMemoryPackageDb>,
) -> Result<Runtime, BuildError> {
    let engine = Arc::new(StubEngine::new().with_packages(packages));
    RuntimeBuilder::new()
        .config(config.clone())
        .bus(Arc::new(bus.connect()))
        .daemon(daemon)
        .engine(engine.clone())
        .network(engine)
        .build()
}

/// 標準入力の行をデーモンのイベントとして流す。EOF で Terminate。
fn spawn_feeder(daemon: Arc<InMemoryDaemon>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match parse_event(&line) {
                Some(event) => {
                    daemon.deliver(event);
                }
                None => warn!(line = %line, "unknown command"),
            }
        }
        daemon.deliver(PlatformEvent::new(AppEvent::Terminate));
    })
}

fn runtime_exit(result: &Result<SessionEnd, RuntimeError>) -> LauncherExit {
    match result {
        Ok(_) => LauncherExit::Success,
        Err(err) => {
            error!(error = %err, kind = %err.kind(), "runtime failed");
            LauncherExit::Failure
        }
    }
}

/// `--runtime`: デーモンから直接起動されたランタイム。イベントは標準入力から。
async fn serve_runtime(config: &TetherConfig, argv: Vec<String>) -> LauncherExit {
    let bus = InMemoryBus::new();
    let packages = Arc::new(demo_packages(argv.first().map(String::as_str).unwrap_or_default()));
    let daemon = Arc::new(InMemoryDaemon::new());
    let runtime = match build_runtime(config, &bus, daemon.clone(), packages) {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(error = %err, "failed to build runtime");
            return LauncherExit::Failure;
        }
    };
    let feeder = spawn_feeder(daemon);
    let result = runtime.run(argv).await;
    feeder.abort();
    runtime_exit(&result)
}

async fn launch(config: Arc<TetherConfig>, args: &[String], target: String, query: bool) -> LauncherExit {
    // (A) ランタイム側: バスに /running を公開
    let bus = InMemoryBus::new();
    let packages = Arc::new(demo_packages(&target));
    let runtime = match build_runtime(&config, &bus, Arc::new(InMemoryDaemon::new()), packages.clone()) {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(error = %err, "failed to build runtime");
            return LauncherExit::Failure;
        }
    };
    if let Err(err) = runtime.serve().await {
        error!(error = %err, "failed to serve runtime");
        return LauncherExit::Failure;
    }

    // (B) ランチャー側: 自分の接続とデーモン登録
    let daemon = Arc::new(InMemoryDaemon::new());
    let mut shim = LauncherShim::new(
        config,
        daemon.clone(),
        Arc::new(bus.connect()),
        packages,
        process_title(args),
    );

    if query {
        return match shim.query_running(&target).await {
            Ok(true) => LauncherExit::Success,
            Ok(false) => LauncherExit::Failure,
            Err(err) => {
                error!(error = %err, "query failed");
                LauncherExit::Failure
            }
        };
    }

    // (C) デーモンからの最初の Reset と、標準入力からのイベント
    daemon.deliver(PlatformEvent::reset(None));
    let feeder = spawn_feeder(daemon);

    let exit = shim.run(&target, &args[1..]).await;
    feeder.abort();

    // (D) ランチャーの接続を切る → ランタイムは owner 消失で Terminate する
    let mut states = runtime.coordinator().watch_state();
    drop(shim);
    let settled = tokio::time::timeout(SHUTDOWN_WAIT, states.wait_for(|state| !state.is_live()))
        .await
        .is_ok_and(|changed| changed.is_ok());
    if !settled {
        warn!(state = %runtime.coordinator().state(), "runtime did not settle after launcher exit");
    }
    info!(status = ?runtime.status(), exit = exit.code(), "launcher finished");
    exit
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    init_tracing();

    let args: Vec<String> = std::env::args().collect();
    let Some(mode) = parse_mode(&args) else {
        eprintln!("usage: tether-launcher [--query | --runtime] <app_id|url|exec-path> [args...]");
        return LauncherExit::Failure.into();
    };

    let config = match TetherConfig::load() {
        Ok(config) => Arc::new(config),
        Err(err) => {
            error!(error = %err, "failed to load configuration");
            return LauncherExit::Failure.into();
        }
    };

    let exit = match mode {
        Mode::Runtime { argv } => serve_runtime(&config, argv).await,
        Mode::Query { target } => launch(config, &args, target, true).await,
        Mode::Launch { target } => launch(config, &args, target, false).await,
    };
    exit.into()
}
