//! tether-core
//!
//! Core building blocks for application lifecycle coordination.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（identity, ids, launch, state, events, errors）
//! - **codec**: app-control bundle のエンコード／デコード
//! - **ports**: 抽象化レイヤー（ApplicationService, LifecycleDaemon, ControlBus, など）
//! - **app**: アプリケーションロジック（coordinator, bridge, control, manager, builder）
//! - **launcher**: ランチャープロセスの処理
//! - **impls**: 実装（InMemoryBus, InMemoryDaemon, StubEngine など開発用）
//! - **config**: 設定の読み込み

pub mod app;
pub mod codec;
pub mod config;
pub mod domain;
pub mod impls;
pub mod launcher;
pub mod ports;
