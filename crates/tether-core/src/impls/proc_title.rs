//! SystemProcessTitle - Linux のプロセス名書き換え
//!
//! 引数領域のモデル（[`ArgvBuffer`]）を書き換えたうえで、
//! カーネル側の comm 名を `prctl(PR_SET_NAME)` で更新します。
//! comm は 15 バイト + NUL までなので、exec path の basename を切り詰めて渡します。

use std::ffi::CString;
use std::path::Path;

use tracing::debug;

use super::argv::ArgvBuffer;
use crate::ports::{ProcessTitle, TitleError, TitleUpdate};

const COMM_LEN: usize = 15;

pub struct SystemProcessTitle {
    argv: ArgvBuffer,
}

impl SystemProcessTitle {
    pub fn from_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            argv: ArgvBuffer::from_args(args),
        }
    }

    pub fn argv(&self) -> &ArgvBuffer {
        &self.argv
    }
}

fn comm_name(identity: &str) -> Result<CString, TitleError> {
    let base = Path::new(identity)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(identity);
    let mut end = base.len().min(COMM_LEN);
    while !base.is_char_boundary(end) {
        end -= 1;
    }
    CString::new(&base[..end]).map_err(|_| TitleError::InteriorNul)
}

impl ProcessTitle for SystemProcessTitle {
    fn capacity(&self) -> usize {
        self.argv.capacity()
    }

    fn set_visible_identity(&mut self, identity: &str) -> Result<TitleUpdate, TitleError> {
        let update = self.argv.set_visible_identity(identity)?;
        let comm = comm_name(identity)?;
        nix::sys::prctl::set_name(&comm).map_err(|err| TitleError::Platform(err.to_string()))?;
        debug!(comm = ?comm, written = update.written, "process title updated");
        Ok(update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comm_uses_a_truncated_basename() {
        let comm = comm_name("/usr/apps/exec-id123/bin/a-rather-long-binary").unwrap();
        assert_eq!(comm.to_str().unwrap(), "a-rather-long-b");
        assert_eq!(comm_name("short").unwrap().to_str().unwrap(), "short");
    }
}
