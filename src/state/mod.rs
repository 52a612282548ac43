//! State management.
//!
//! Records what each apply created (platform identifiers, spec hashes and
//! derived values) so later runs can diff against it, export outputs and
//! destroy the stack.

mod local;
mod lock;
mod s3;
mod store;
mod types;

pub use local::LocalStateStore;
pub use lock::{LOCK_EXPIRY_SECS, LockInfo, generate_holder_id};
pub use s3::S3StateStore;
pub use store::{StateStore, with_lock};
pub use types::{
    DeploymentHistoryEntry, DeploymentOperation, DeploymentState, ResourceState, ResourceStatus,
    STATE_VERSION, keys,
};
