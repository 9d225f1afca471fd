//! InMemoryPackageDb - identity → exec path
//!
//! ユーザーごとの DB を先に引き、なければグローバル DB を引きます。

use std::collections::HashMap;
use std::path::PathBuf;

use crate::domain::ApplicationIdentity;
use crate::ports::{PackageError, PackageResolver};

#[derive(Debug, Clone, Default)]
pub struct InMemoryPackageDb {
    user: HashMap<String, PathBuf>,
    global: HashMap<String, PathBuf>,
    unavailable: Option<String>,
}

impl InMemoryPackageDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user_package(mut self, identity: &str, exec: impl Into<PathBuf>) -> Self {
        self.user.insert(identity.to_owned(), exec.into());
        self
    }

    pub fn with_global_package(mut self, identity: &str, exec: impl Into<PathBuf>) -> Self {
        self.global.insert(identity.to_owned(), exec.into());
        self
    }

    /// Every lookup fails with `PackageError::Unavailable`.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            unavailable: Some(reason.into()),
            ..Self::default()
        }
    }
}

impl PackageResolver for InMemoryPackageDb {
    fn exec_path(&self, identity: &ApplicationIdentity) -> Result<PathBuf, PackageError> {
        if let Some(reason) = &self.unavailable {
            return Err(PackageError::Unavailable(reason.clone()));
        }
        self.user
            .get(identity.as_str())
            .or_else(|| self.global.get(identity.as_str()))
            .cloned()
            .ok_or_else(|| PackageError::NotFound(identity.clone()))
    }
}
