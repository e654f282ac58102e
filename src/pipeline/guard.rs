//! Epoch guard: cooperative cancellation scope for pipeline bodies
//!
//! Bound to the shard's epoch at request construction. Every suspension
//! point in the body is wrapped in [`EpochGuard::run`], which races the
//! awaited future against the shard's epoch watch channel: if the live
//! epoch diverges from the snapshot (or the shard goes away), the wrapped
//! future is dropped and the body unwinds with [`Abort::Cancelled`].

use std::future::Future;

use tokio::sync::watch;

use crate::{
    error::{Abort, PipelineResult},
    types::{Epoch, ShardId},
};

/// Cancellation condition bound to `(shard, epoch-at-start)`.
pub struct EpochGuard {
    shard: ShardId,
    started_at: Epoch,
    epoch_rx: watch::Receiver<Epoch>,
}

impl EpochGuard {
    pub fn new(shard: ShardId, started_at: Epoch, epoch_rx: watch::Receiver<Epoch>) -> Self {
        Self {
            shard,
            started_at,
            epoch_rx,
        }
    }

    pub fn started_at(&self) -> Epoch {
        self.started_at
    }

    fn cancelled(&self, observed: Epoch) -> Abort {
        Abort::Cancelled {
            shard: self.shard,
            started_at: self.started_at,
            observed,
        }
    }

    /// Non-suspending staleness check.
    pub fn check(&self) -> PipelineResult<()> {
        let observed = *self.epoch_rx.borrow();
        if observed != self.started_at {
            return Err(self.cancelled(observed));
        }
        Ok(())
    }

    /// Run `fut` as a cancellation point. The future is not polled at all if
    /// the epoch is already stale, and is dropped mid-flight if the epoch
    /// advances while it is pending.
    pub async fn run<F: Future>(&self, fut: F) -> PipelineResult<F::Output> {
        self.check()?;
        let mut epoch_rx = self.epoch_rx.clone();
        tokio::pin!(fut);
        loop {
            tokio::select! {
                out = &mut fut => return Ok(out),
                changed = epoch_rx.changed() => {
                    let observed = *epoch_rx.borrow();
                    if changed.is_err() {
                        // Shard dropped its epoch publisher: the shard object
                        // itself is no longer valid.
                        return Err(self.cancelled(observed));
                    }
                    if observed != self.started_at {
                        return Err(self.cancelled(observed));
                    }
                }
            }
        }
    }
}
