//! Commit path: two-phase acknowledgment of shard effects
//!
//! An executed operation produces a [`ShardEffect`] that is handed to the
//! shard's commit path. Submission returns two independently awaitable
//! signals: `submitted` fires when the effect has been sequenced relative to
//! other effects on the shard, `completed` fires when it is durably applied.
//! Callers wait for submission first, then durability; "ordered but not yet
//! durable" is an observable intermediate state.

use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::types::{ObjectId, RequestId, SubOp};

/// The effect an executed operation wants applied durably. Read-only
/// operations produce an empty mutation list and still traverse the commit
/// path, so completion bookkeeping is uniform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardEffect {
    pub request: RequestId,
    pub oid: ObjectId,
    pub mutations: Vec<SubOp>,
}

impl ShardEffect {
    pub fn is_read_only(&self) -> bool {
        self.mutations.is_empty()
    }
}

/// The (submitted, completed) signal pair returned by effect submission.
pub struct CommitHandles {
    pub submitted: oneshot::Receiver<()>,
    pub completed: oneshot::Receiver<()>,
}

struct PendingEffect {
    effect: ShardEffect,
    submitted_tx: oneshot::Sender<()>,
    completed_tx: oneshot::Sender<()>,
}

/// Append-only commit path applying effects strictly in submission order.
///
/// Backed by a background apply task; `durability_delay` models the journal
/// flush latency between sequencing and durability.
pub struct CommitQueue {
    tx: mpsc::UnboundedSender<PendingEffect>,
    journal: Arc<Mutex<Vec<ShardEffect>>>,
}

impl CommitQueue {
    /// Start the apply task. Effects become durable `durability_delay` after
    /// they are sequenced.
    pub fn start(durability_delay: Duration) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<PendingEffect>();
        let journal: Arc<Mutex<Vec<ShardEffect>>> = Arc::new(Mutex::new(Vec::new()));
        let applied = Arc::clone(&journal);

        tokio::spawn(async move {
            while let Some(pending) = rx.recv().await {
                // Sequenced: ordering relative to other effects is fixed.
                let _ = pending.submitted_tx.send(());
                if !durability_delay.is_zero() {
                    tokio::time::sleep(durability_delay).await;
                }
                debug!(
                    request = %pending.effect.request,
                    oid = %pending.effect.oid,
                    mutations = pending.effect.mutations.len(),
                    "effect durably applied"
                );
                applied.lock().push(pending.effect);
                let _ = pending.completed_tx.send(());
            }
        });

        Self { tx, journal }
    }

    /// Hand an effect to the commit path. Sequencing order equals call
    /// order; this never suspends.
    pub fn submit(&self, effect: ShardEffect) -> CommitHandles {
        let (submitted_tx, submitted) = oneshot::channel();
        let (completed_tx, completed) = oneshot::channel();
        // Receiver lives for the lifetime of the queue; send cannot fail
        // while self is alive.
        let _ = self.tx.send(PendingEffect {
            effect,
            submitted_tx,
            completed_tx,
        });
        CommitHandles {
            submitted,
            completed,
        }
    }

    /// Durably applied effects, in apply order.
    pub fn journal(&self) -> Vec<ShardEffect> {
        self.journal.lock().clone()
    }
}
