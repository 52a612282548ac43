//! Storage seam for recorded deployments.
//!
//! A store holds one [`DeploymentState`] per project: the resources the last
//! `apply` created, their spec hashes, the exported outputs and the run
//! history. `apply` and `destroy` read and write it under an exclusive lock
//! so two runs never interleave their resource records.

use async_trait::async_trait;
use std::future::Future;
use tracing::{debug, warn};

use super::lock::{LockInfo, generate_holder_id};
use super::types::DeploymentState;
use crate::error::Result;

/// Backend holding the recorded deployment of one project.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Reads the recorded deployment, `None` before the first apply.
    async fn load(&self) -> Result<Option<DeploymentState>>;

    /// Replaces the recorded deployment.
    ///
    /// Called after every resource during `apply`, so a failed run can
    /// resume from what was persisted.
    async fn save(&self, state: &DeploymentState) -> Result<()>;

    /// Forgets the recorded deployment. Used once `destroy` has removed
    /// every resource.
    async fn delete(&self) -> Result<()>;

    /// Returns true if a deployment has been recorded.
    async fn exists(&self) -> Result<bool>;

    /// Takes the exclusive lock for `operation` (`apply` or `destroy`).
    ///
    /// # Errors
    ///
    /// Fails with `StateError::LockedByOther` while another holder has a
    /// lock that has not expired.
    async fn acquire_lock(&self, holder: &str, operation: &str) -> Result<LockInfo>;

    /// Releases the lock identified by `lock_id`.
    async fn release_lock(&self, lock_id: &str) -> Result<()>;

    /// Current lock holder, if any.
    async fn get_lock_info(&self) -> Result<Option<LockInfo>>;

    /// Returns true while a lock is held.
    async fn is_locked(&self) -> Result<bool>;

    /// Short backend name shown by `state`.
    fn backend_type(&self) -> &'static str;
}

/// Runs `work` while holding the state lock for `operation`.
///
/// The lock is taken before `work` starts, so everything it reads from the
/// store (recorded state, diff inputs) is protected along with the writes.
/// The lock is released whatever the outcome.
///
/// # Errors
///
/// Returns the lock error if the lock cannot be taken, otherwise the
/// outcome of `work`.
pub async fn with_lock<T, F, Fut>(store: &dyn StateStore, operation: &str, work: F) -> Result<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let lock = store.acquire_lock(&generate_holder_id(), operation).await?;
    debug!("Acquired state lock {} for {operation}", lock.lock_id);

    let outcome = work().await;

    if let Err(e) = store.release_lock(&lock.lock_id).await {
        warn!("Failed to release state lock {}: {e}", lock.lock_id);
    }
    outcome
}
