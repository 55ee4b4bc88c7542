// Container lifecycle: state inspection, reconciliation and the name lock.

mod lock;
mod manager;
mod state;

pub use lock::NameLock;
pub use manager::{Desired, LifecycleManager, StartOutcome, StatusReport};
pub use state::{ContainerState, inspect_state};
