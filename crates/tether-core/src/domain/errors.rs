//! Errors - エラー分類と IPC 境界を越えるための表現
//!
//! 各コンポーネントは自前の thiserror enum を持ち、`kind()` で
//! [`ErrorKind`] に分類されます。バスを越えるときは [`Failure`] に変換し、
//! 生のエラー型は相手プロセスに渡しません。

use std::fmt;

use serde::{Deserialize, Serialize};

/// ErrorKind は運用上の分類
///
/// - Identity: 不正な application id（副作用なしで中止）
/// - Resolution: パッケージ情報や起動に失敗（NoApp のまま）
/// - Registration: ライフサイクルデーモンへの登録失敗
/// - PeerLoss: owner プロセスの消失（呼び出し元には返さない）
/// - Protocol: 単回チャネルの二重読み出し、壊れた bundle など
/// - Bus / Engine: 外部コンポーネントの障害
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Identity,
    Resolution,
    Registration,
    PeerLoss,
    Protocol,
    Bus,
    Engine,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Identity => "identity",
            ErrorKind::Resolution => "resolution",
            ErrorKind::Registration => "registration",
            ErrorKind::PeerLoss => "peer_loss",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Bus => "bus",
            ErrorKind::Engine => "engine",
        };
        f.write_str(name)
    }
}

/// Failure is the structured error carried in an IPC reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: ErrorKind,
    pub message: String,
}

impl Failure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failure: {}", self.kind, self.message)
    }
}

impl std::error::Error for Failure {}
