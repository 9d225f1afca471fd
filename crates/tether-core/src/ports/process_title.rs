//! ProcessTitle port - プロセス自身の見え方（ps などで見える名前）
//!
//! 書き換えは元の引数バッファの総バイト長を超えない。

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum TitleError {
    #[error("process has no argument buffer to rewrite")]
    NoCapacity,

    #[error("visible identity contains a NUL byte")]
    InteriorNul,

    #[error("platform refused the process name: {0}")]
    Platform(String),
}

/// What a rewrite actually produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleUpdate {
    pub written: usize,
    pub truncated: bool,
}

pub trait ProcessTitle: Send {
    /// Total bytes available (original argv region, NULs included).
    fn capacity(&self) -> usize;

    fn set_visible_identity(&mut self, identity: &str) -> Result<TitleUpdate, TitleError>;
}
