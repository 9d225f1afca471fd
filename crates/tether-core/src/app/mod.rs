//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてライフサイクル調停を実装します。
//!
//! # 主要コンポーネント
//! - **Coordinator**: インスタンスの所有と状態遷移
//! - **PlatformEventBridge**: デーモンのイベント → Coordinator 呼び出し
//! - **ControlObject / ControlRegistry / OwnerWatch**: バス公開オブジェクトと owner 監視
//! - **LaunchManager**: ランチャーからの Launch 要求の受け口
//! - **IoContext**: エンジン I/O スレッドへの受け渡し
//! - **RuntimeBuilder / Runtime**: ワイヤリング

pub mod bridge;
pub mod builder;
pub mod channel_slot;
pub mod control;
pub mod coordinator;
pub mod io_context;
pub mod manager;
pub mod owner_watch;
pub mod registry;
pub mod runtime;
pub mod status;

// 主要な型を再エクスポート
pub use self::bridge::{BridgeError, BridgeSession, PlatformEventBridge, SessionEnd};
pub use self::builder::{BuildError, RuntimeBuilder};
pub use self::channel_slot::{ChannelError, ChannelSlot};
pub use self::control::{ControlError, ControlObject, ControlTimeouts};
pub use self::coordinator::{Coordinator, LifecycleError, ResetOutcome};
pub use self::io_context::{IoContext, IoError};
pub use self::manager::LaunchManager;
pub use self::owner_watch::OwnerWatch;
pub use self::registry::ControlRegistry;
pub use self::runtime::{Runtime, RuntimeError};
pub use self::status::{InstanceCounts, InstanceInfo, StatusView};
