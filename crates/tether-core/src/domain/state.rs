//! Application lifecycle state machine.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::ids::InstanceId;

/// Lifecycle state.
///
/// State transitions:
/// - NoApp -> Launching -> Running
/// - Running <-> Suspended
/// - Launching/Running/Suspended -> Terminated
///
/// `NoApp` and `Terminated` are only ever reported by the coordinator when it
/// has no current instance; a live instance record is always in one of the
/// other three states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    NoApp,
    Launching,
    Running,
    Suspended,
    Terminated,
}

/// A request that maps onto an engine call.
///
/// `Hide` only affects the application's windows and never moves the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleCommand {
    Suspend,
    Resume,
    Terminate,
    Hide,
}

impl LifecycleState {
    /// Is there a live instance in this state?
    pub fn is_live(self) -> bool {
        matches!(
            self,
            LifecycleState::Launching | LifecycleState::Running | LifecycleState::Suspended
        )
    }

    /// Can the windows of an instance in this state be hidden?
    pub fn accepts_hide(self) -> bool {
        matches!(self, LifecycleState::Running | LifecycleState::Suspended)
    }

    /// Target state of `command`, or `None` when the command does not apply.
    ///
    /// Returning `Some(self)` means "already there" and needs no engine call.
    /// `Hide` is not a transition and never applies here.
    pub fn apply(self, command: LifecycleCommand) -> Option<LifecycleState> {
        use LifecycleCommand::*;
        use LifecycleState::*;

        match (self, command) {
            (Launching | Running | Suspended, Terminate) => Some(Terminated),
            (Terminated, Terminate) => Some(Terminated),
            (Running, Suspend) => Some(Suspended),
            (Suspended, Suspend) => Some(Suspended),
            (Suspended, Resume) => Some(Running),
            (Running, Resume) => Some(Running),
            _ => None,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::NoApp => "no_app",
            LifecycleState::Launching => "launching",
            LifecycleState::Running => "running",
            LifecycleState::Suspended => "suspended",
            LifecycleState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

impl fmt::Display for LifecycleCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleCommand::Suspend => "suspend",
            LifecycleCommand::Resume => "resume",
            LifecycleCommand::Terminate => "terminate",
            LifecycleCommand::Hide => "hide",
        };
        f.write_str(name)
    }
}

/// Result of a Terminate/Pause/Resume request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The engine was called and the instance moved `from -> to`.
    Applied {
        instance: InstanceId,
        from: LifecycleState,
        to: LifecycleState,
    },
    /// The instance was already in the requested state.
    Unchanged {
        instance: InstanceId,
        state: LifecycleState,
    },
    /// The command does not apply to the instance's current state.
    Ignored {
        instance: InstanceId,
        state: LifecycleState,
    },
    /// No (current) instance to act on.
    NoInstance,
}

impl TransitionOutcome {
    /// Does an instance exist and sit in the requested state afterwards?
    pub fn reached_target(&self) -> bool {
        matches!(
            self,
            TransitionOutcome::Applied { .. } | TransitionOutcome::Unchanged { .. }
        )
    }
}
