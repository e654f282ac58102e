//! Shard collaborator boundary
//!
//! The pipeline does not own shard internals (recovery, the executor's
//! object-state interpretation, the journal); it drives them through this
//! trait. [`local::LocalShard`] is a complete in-memory implementation used
//! by tests and embedders.

pub mod local;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::{
    classify::{LockMode, OpInfo},
    commit::{CommitHandles, ShardEffect},
    error::ExecError,
    object::{LockedObc, ObcLoader},
    pipeline::ShardPipeline,
    types::{Epoch, ObjectId, RequestId, ShardId, SubOp},
};

pub use local::LocalShard;

/// Result of the recovery probe for a target object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// The object is locally available (possibly after recovery ran).
    Found,
    /// Recovery cannot produce the object; the operation should be dropped.
    Unfound,
}

/// One replicated shard, as seen by the internal operation pipeline.
#[async_trait]
pub trait Shard: Send + Sync {
    fn id(&self) -> ShardId;

    /// Current membership/role epoch.
    fn epoch(&self) -> Epoch;

    /// Watch channel publishing epoch advances; wiring for the epoch guard.
    fn epoch_watch(&self) -> watch::Receiver<Epoch>;

    /// Whether this replica currently holds the primary role.
    fn is_primary(&self) -> bool;

    /// The per-shard stage registry.
    fn pipeline(&self) -> &ShardPipeline;

    /// The per-shard object context loader.
    fn obc_loader(&self) -> &ObcLoader;

    /// Lock mode to take for an operation with the given classification.
    fn lock_mode(&self, op_info: &OpInfo) -> LockMode {
        op_info.lock_mode()
    }

    /// Ensure the target object is locally available, triggering recovery if
    /// necessary.
    async fn recover_missing(&self, oid: &ObjectId) -> RecoveryOutcome;

    /// Bind the locked object context and sub-operation list to the
    /// executor and run it, producing the effect to commit.
    async fn run_executer(
        &self,
        request: RequestId,
        obc: &mut LockedObc,
        op_info: &OpInfo,
        ops: &[SubOp],
    ) -> Result<ShardEffect, ExecError>;

    /// Hand an executed effect to the commit path. Sequencing order equals
    /// call order; this never suspends.
    fn submit_effect(&self, effect: ShardEffect) -> CommitHandles;
}
