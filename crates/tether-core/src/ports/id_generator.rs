//! IdGenerator port - ID 生成の抽象化
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース（本番用）

use crate::domain::InstanceId;
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator はインスタンス世代の ID を生成
///
/// # ULID の特性
/// - 時刻でソート可能（後の世代ほど大きい）
/// - 128-bit（UUID 互換）
pub trait IdGenerator: Send + Sync {
    fn generate_instance_id(&self) -> InstanceId;
}

/// UlidGenerator は Clock の時刻 + 乱数部で ULID を作る
///
/// テスト時は FixedClock を使って timestamp 部分を固定できます。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_instance_id(&self) -> InstanceId {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        let ulid = Ulid::from_parts(timestamp_ms, rand::random());
        InstanceId::from(ulid)
    }
}
