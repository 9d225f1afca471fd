//! Impls - ports の実装（開発用・テスト用）
//!
//! # 含まれる実装
//! - **InMemoryBus**: プロセス内の制御バス
//! - **InMemoryDaemon**: ライフサイクルデーモンの代役
//! - **InMemoryPackageDb**: ユーザー DB → グローバル DB の順で引くパッケージ DB
//! - **StubEngine**: ブラウザエンジンの代役
//! - **ArgvBuffer** / **SystemProcessTitle**: プロセス名の書き換え
//! - **TracingEventSink**: ドメインイベントのログ出力

pub mod argv;
pub mod inmem_bus;
pub mod inmem_daemon;
pub mod package_db;
#[cfg(target_os = "linux")]
pub mod proc_title;
pub mod stub_engine;
pub mod tracing_sink;

pub use self::argv::ArgvBuffer;
pub use self::inmem_bus::{BusConnection, InMemoryBus};
pub use self::inmem_daemon::{InMemoryDaemon, RegistrationRecord};
pub use self::package_db::InMemoryPackageDb;
#[cfg(target_os = "linux")]
pub use self::proc_title::SystemProcessTitle;
pub use self::stub_engine::{LaunchRecord, StubApplication, StubEngine};
pub use self::tracing_sink::TracingEventSink;
