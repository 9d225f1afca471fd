//! Domain model (identity, launch requests, lifecycle state, events, errors).

pub mod errors;
pub mod events;
pub mod identity;
pub mod ids;
pub mod launch;
pub mod state;

pub use self::errors::{ErrorKind, Failure};
pub use self::events::{AppEvent, DomainEvent, PlatformEvent};
pub use self::identity::{ApplicationIdentity, IdentityError};
pub use self::ids::InstanceId;
pub use self::launch::{LaunchParams, LaunchRequest, positional_args};
pub use self::state::{LifecycleCommand, LifecycleState, TransitionOutcome};
