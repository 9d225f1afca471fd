//! NetworkContext port - エンジンの I/O コンテキストでのみ呼べる操作
//!
//! 実装はエンジンの I/O スレッド上で呼ばれる前提です。
//! イベントループ側からは `app::IoContext` 経由で渡します。

/// Storage and request-context operations of the browser engine.
pub trait NetworkContext: Send + Sync {
    fn set_user_agent(&self, value: &str);

    fn remove_all_cookies(&self);
}
