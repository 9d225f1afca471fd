//! PackageResolver port - パッケージメタデータ（identity → exec path）

use std::path::PathBuf;

use thiserror::Error;

use crate::domain::{ApplicationIdentity, ErrorKind};

#[derive(Debug, Clone, Error)]
pub enum PackageError {
    #[error("couldn't find exec path for application {0}")]
    NotFound(ApplicationIdentity),

    #[error("package database unavailable: {0}")]
    Unavailable(String),
}

impl PackageError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Resolution
    }
}

pub trait PackageResolver: Send + Sync {
    fn exec_path(&self, identity: &ApplicationIdentity) -> Result<PathBuf, PackageError>;
}
