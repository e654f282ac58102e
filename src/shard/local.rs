//! In-memory shard replica
//!
//! Implements the [`Shard`] boundary for a single locally hosted replica:
//! epoch published through a watch channel, recovery probe backed by an
//! unfound set, an executor interpreting every sub-operation against object
//! state, and a FIFO commit queue with configurable durability latency.

use std::{collections::HashSet, sync::Arc};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::debug;

use super::{RecoveryOutcome, Shard};
use crate::{
    classify::OpInfo,
    commit::{CommitHandles, CommitQueue, ShardEffect},
    config::{ConfigResult, ShardConfig},
    error::ExecError,
    object::{LockedObc, ObcLoader, ObjectState},
    pipeline::ShardPipeline,
    types::{Epoch, ObjectId, RequestId, ShardId, SubOp},
};

pub struct LocalShard {
    id: ShardId,
    primary: bool,
    epoch_tx: watch::Sender<Epoch>,
    epoch_rx: watch::Receiver<Epoch>,
    pipeline: ShardPipeline,
    loader: ObcLoader,
    unfound: Mutex<HashSet<ObjectId>>,
    commits: CommitQueue,
}

impl LocalShard {
    /// Build a shard replica from config. Must run inside a tokio runtime;
    /// the commit apply task starts immediately.
    pub fn from_config(config: ShardConfig) -> ConfigResult<Arc<Self>> {
        config.validate()?;
        let (epoch_tx, epoch_rx) = watch::channel(config.epoch);
        Ok(Arc::new(Self {
            id: config.shard,
            primary: config.primary,
            epoch_tx,
            epoch_rx,
            pipeline: ShardPipeline::new(),
            loader: ObcLoader::new(),
            unfound: Mutex::new(HashSet::new()),
            commits: CommitQueue::start(config.durability_delay()),
        }))
    }

    /// Advance the membership epoch, as a map change would. In-flight
    /// requests bound to the old epoch cancel at their next suspension
    /// point.
    pub fn advance_epoch(&self) -> Epoch {
        self.epoch_tx.send_modify(|e| *e = e.next());
        let epoch = *self.epoch_rx.borrow();
        debug!(shard = %self.id, epoch = %epoch, "epoch advanced");
        epoch
    }

    /// Mark an object as unrecoverable; the recovery probe will report it
    /// unfound.
    pub fn mark_unfound(&self, oid: ObjectId) {
        self.unfound.lock().insert(oid);
    }

    /// Seed an object with initial contents.
    pub async fn create_object(&self, oid: ObjectId, data: Vec<u8>) {
        self.loader
            .insert_object(
                oid,
                ObjectState {
                    exists: true,
                    data,
                    attrs: Default::default(),
                },
            )
            .await;
    }

    /// Durably applied effects, in apply order.
    pub fn journal(&self) -> Vec<ShardEffect> {
        self.commits.journal()
    }

    fn apply_op(oid: &ObjectId, state: &mut ObjectState, op: &SubOp) -> Result<(), ExecError> {
        let out_of_range = |op: &SubOp| ExecError::Rejected {
            oid: oid.clone(),
            op: op.name(),
            reason: "extent beyond the addressable object range".to_string(),
        };
        match op {
            SubOp::Write { off, data } => {
                let off = usize::try_from(*off).map_err(|_| out_of_range(op))?;
                let end = off.checked_add(data.len()).ok_or_else(|| out_of_range(op))?;
                if state.data.len() < end {
                    state.data.resize(end, 0);
                }
                state.data[off..end].copy_from_slice(data);
                state.exists = true;
            }
            SubOp::WriteFull { data } => {
                state.data = data.clone();
                state.exists = true;
            }
            SubOp::Truncate { size } => {
                let size = usize::try_from(*size).map_err(|_| out_of_range(op))?;
                state.data.resize(size, 0);
                state.exists = true;
            }
            SubOp::SetAttr { key, value } => {
                state.attrs.insert(key.clone(), value.clone());
                state.exists = true;
            }
            SubOp::Delete => {
                *state = ObjectState::default();
            }
            SubOp::Read { .. } | SubOp::Stat | SubOp::GetAttr { .. } => {}
        }
        Ok(())
    }
}

#[async_trait]
impl Shard for LocalShard {
    fn id(&self) -> ShardId {
        self.id
    }

    fn epoch(&self) -> Epoch {
        *self.epoch_rx.borrow()
    }

    fn epoch_watch(&self) -> watch::Receiver<Epoch> {
        self.epoch_rx.clone()
    }

    fn is_primary(&self) -> bool {
        self.primary
    }

    fn pipeline(&self) -> &ShardPipeline {
        &self.pipeline
    }

    fn obc_loader(&self) -> &ObcLoader {
        &self.loader
    }

    async fn recover_missing(&self, oid: &ObjectId) -> RecoveryOutcome {
        if self.unfound.lock().contains(oid) {
            debug!(shard = %self.id, oid = %oid, "recovery probe: unfound");
            RecoveryOutcome::Unfound
        } else {
            RecoveryOutcome::Found
        }
    }

    async fn run_executer(
        &self,
        request: RequestId,
        obc: &mut LockedObc,
        op_info: &OpInfo,
        ops: &[SubOp],
    ) -> Result<ShardEffect, ExecError> {
        let oid = obc.oid().clone();
        let mutations: Vec<SubOp> = ops.iter().filter(|op| op.is_mutating()).cloned().collect();

        if !mutations.is_empty() {
            let state = obc.state_mut().ok_or_else(|| ExecError::Rejected {
                oid: oid.clone(),
                op: mutations[0].name(),
                reason: "mutating sub-operation under a shared lock".to_string(),
            })?;
            for op in &mutations {
                Self::apply_op(&oid, state, op)?;
            }
        }
        debug!(
            shard = %self.id,
            request = %request,
            oid = %oid,
            read_only = op_info.is_read_only(),
            ops = ops.len(),
            "executer ran"
        );

        Ok(ShardEffect {
            request,
            oid,
            mutations,
        })
    }

    fn submit_effect(&self, effect: ShardEffect) -> CommitHandles {
        self.commits.submit(effect)
    }
}
