//! Engine-facing ports: the application service and the applications it
//! launches.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{ApplicationIdentity, ErrorKind, LaunchParams};

#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("launch of {identity} failed: {reason}")]
    LaunchFailed {
        identity: ApplicationIdentity,
        reason: String,
    },

    #[error("engine rejected {operation}: {reason}")]
    Rejected {
        operation: &'static str,
        reason: String,
    },
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::LaunchFailed { .. } => ErrorKind::Resolution,
            EngineError::Rejected { .. } => ErrorKind::Engine,
        }
    }
}

/// Engine-level application object.
#[async_trait]
pub trait Application: Send + Sync {
    async fn suspend(&self) -> Result<(), EngineError>;

    async fn resume(&self) -> Result<(), EngineError>;

    async fn terminate(&self) -> Result<(), EngineError>;

    /// Hide every window of the application. The lifecycle state is untouched.
    async fn hide(&self) -> Result<(), EngineError>;
}

/// Creates applications from a validated identity.
///
/// Package metadata lookup happens behind this seam; a missing package is
/// reported as `EngineError::LaunchFailed`.
#[async_trait]
pub trait ApplicationService: Send + Sync {
    async fn launch(
        &self,
        identity: &ApplicationIdentity,
        params: &LaunchParams,
    ) -> Result<Arc<dyn Application>, EngineError>;
}
