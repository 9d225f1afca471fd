//! ArgvBuffer - 元の引数領域のモデル
//!
//! 引数は NUL 区切りで連続した 1 つの領域に並んでいる前提です。
//! 書き換えは領域全体をゼロで埋めてから先頭に書き込み、
//! 終端の NUL 1 バイト分を必ず残します。

use std::borrow::Cow;

use crate::ports::{ProcessTitle, TitleError, TitleUpdate};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgvBuffer {
    bytes: Vec<u8>,
}

impl ArgvBuffer {
    /// `args` を NUL 区切りで並べた領域（容量 = Σ(len + 1)）
    pub fn from_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut bytes = Vec::new();
        for arg in args {
            bytes.extend_from_slice(arg.as_ref().as_bytes());
            bytes.push(0);
        }
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// 最初の NUL までの見え方（`ps` の表示に相当）
    pub fn visible(&self) -> Cow<'_, str> {
        let end = self
            .bytes
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(self.bytes.len());
        String::from_utf8_lossy(&self.bytes[..end])
    }
}

impl ProcessTitle for ArgvBuffer {
    fn capacity(&self) -> usize {
        self.bytes.len()
    }

    fn set_visible_identity(&mut self, identity: &str) -> Result<TitleUpdate, TitleError> {
        if self.bytes.is_empty() {
            return Err(TitleError::NoCapacity);
        }
        if identity.as_bytes().contains(&0) {
            return Err(TitleError::InteriorNul);
        }

        let limit = self.bytes.len() - 1;
        let written = identity.len().min(limit);
        self.bytes.fill(0);
        self.bytes[..written].copy_from_slice(&identity.as_bytes()[..written]);

        Ok(TitleUpdate {
            written,
            truncated: written < identity.len(),
        })
    }
}
