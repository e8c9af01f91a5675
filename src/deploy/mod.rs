// ABOUTME: Blue-green deployment: phases, rollback plan, remote layout and the deployer.
// ABOUTME: Everything here reaches the host only through an Executor.

pub(crate) mod commands;
mod error;
mod layout;
mod lock;
mod orchestrator;
mod rollback;
mod state;

pub use commands::RunSpec;
pub use error::{DeployError, DeployErrorKind, LockError, PhaseFailure};
pub use layout::{ContainerNames, LOCK_FILE, RELEASE_MARKER, RemoteLayout};
pub use lock::{DeployLock, LockInfo};
pub use orchestrator::{DeployReport, Deployer, ReleaseMarker, RunOptions};
pub use rollback::{RollbackAction, rollback_actions};
pub use state::{DeployPhase, DeployState, TransitionError};
