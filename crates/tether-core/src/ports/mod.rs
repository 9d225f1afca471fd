//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」。外部コンポーネント
//! （ブラウザエンジン、ライフサイクルデーモン、IPC バス、パッケージ DB、
//! プロセス名）への境界を trait で定義します。

pub mod application;
pub mod bus;
pub mod clock;
pub mod daemon;
pub mod event_sink;
pub mod id_generator;
pub mod network;
pub mod package;
pub mod process_title;
pub mod protocol;

pub use self::application::{Application, ApplicationService, EngineError};
pub use self::bus::{BusError, ControlBus, MethodHandler};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::daemon::{DaemonError, LifecycleDaemon, Registration};
pub use self::event_sink::EventSink;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::network::NetworkContext;
pub use self::package::{PackageError, PackageResolver};
pub use self::process_title::{ProcessTitle, TitleError, TitleUpdate};
pub use self::protocol::{BusName, ChannelHandle, ObjectPath, Reply, Request};
