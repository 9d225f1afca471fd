//! EventSink port - ドメインイベントの通知先
//!
//! Coordinator は状態遷移のたびに登録された全 sink に DomainEvent を渡します。
//! - TracingEventSink: ログ出力
//! - ControlRegistry: Terminated で制御オブジェクトを片付ける

use async_trait::async_trait;

use crate::domain::DomainEvent;

/// EventSink はドメインイベントを受け取る
///
/// emit は Coordinator のロックを持ったまま呼ばれるので、
/// 実装から Coordinator を呼び返してはいけない。
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: &DomainEvent);
}
