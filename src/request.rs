//! Internal client request driver
//!
//! Runs one internally generated operation against its shard: a single
//! linear, suspend-capable body advancing through the shard's pipeline
//! stages in strict order under the epoch guard, then waiting out the
//! two-phase commit acknowledgment. `start()` is the sole entry point
//! and no error ever propagates out of it: "unfound" and epoch
//! cancellation are silent, everything else is a defect and halts the
//! request.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::{
    classify::OpInfo,
    error::{Abort, Fatal, PipelineResult},
    events::{EventSink, RequestEvent, SharedEventSink, TracingEventSink},
    pipeline::{EpochGuard, LifecycleHandle, ReleaseProbe},
    shard::{RecoveryOutcome, Shard},
    types::{Epoch, ObjectId, RequestId, SubOp},
};

/// Caller collaborator: a concrete internal request type supplies the
/// target object and the sub-operation list to execute.
pub trait InternalRequest: Send + Sync {
    fn target(&self) -> ObjectId;
    fn ops(&self) -> Vec<SubOp>;
}

/// Where in the pipeline a request currently is. Observability only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    Created,
    RecoverMissing,
    CheckComplete,
    Classify,
    LockWait,
    Loaded,
    Process,
    Submitted,
    Completed,
    Cancelled,
    Dropped,
}

/// Shared view of a request's phase, for tests and monitoring.
#[derive(Clone)]
pub struct PhaseProbe(Arc<Mutex<RequestPhase>>);

impl PhaseProbe {
    pub fn get(&self) -> RequestPhase {
        *self.0.lock()
    }
}

/// Shared view of the classification record once derived.
#[derive(Clone)]
pub struct ClassificationProbe(Arc<Mutex<Option<OpInfo>>>);

impl ClassificationProbe {
    pub fn get(&self) -> Option<OpInfo> {
        self.0.lock().clone()
    }
}

/// One internally generated operation bound to a shard and an epoch
/// snapshot. Single-writer: only its own execution body mutates it, and at
/// most one body runs per instance (`start` consumes self).
pub struct InternalClientRequest {
    shard: Arc<dyn Shard>,
    inner: Arc<dyn InternalRequest>,
    id: RequestId,
    start_epoch: Epoch,
    handle: LifecycleHandle,
    events: SharedEventSink,
    phase: Arc<Mutex<RequestPhase>>,
    classification: Arc<Mutex<Option<OpInfo>>>,
}

impl InternalClientRequest {
    /// Bind a request to its shard, snapshotting the current epoch.
    ///
    /// The shard must hold the primary role; violating that is a
    /// programming error in the caller, not a runtime condition.
    pub fn new(shard: Arc<dyn Shard>, inner: Arc<dyn InternalRequest>) -> Self {
        assert!(
            shard.is_primary(),
            "internal requests may only be constructed against a primary shard replica"
        );
        let start_epoch = shard.epoch();
        Self {
            shard,
            inner,
            id: RequestId::new(),
            start_epoch,
            handle: LifecycleHandle::new(),
            events: Arc::new(TracingEventSink),
            phase: Arc::new(Mutex::new(RequestPhase::Created)),
            classification: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_events(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn start_epoch(&self) -> Epoch {
        self.start_epoch
    }

    pub fn phase_probe(&self) -> PhaseProbe {
        PhaseProbe(Arc::clone(&self.phase))
    }

    pub fn classification_probe(&self) -> ClassificationProbe {
        ClassificationProbe(Arc::clone(&self.classification))
    }

    pub fn release_probe(&self) -> ReleaseProbe {
        self.handle.release_probe()
    }

    fn set_phase(&self, phase: RequestPhase) {
        *self.phase.lock() = phase;
    }

    /// Sole public entry point. Runs the pipeline body under the epoch
    /// guard; converts "unfound" and cancellation into silent success; and
    /// releases stage occupancy exactly once on every path.
    pub async fn start(mut self) {
        self.events.on_event(self.id, &RequestEvent::Started);
        let guard = EpochGuard::new(self.shard.id(), self.start_epoch, self.shard.epoch_watch());

        match self.run_pipeline(&guard).await {
            Ok(()) => {
                self.events.on_event(self.id, &RequestEvent::Completed);
            }
            Err(Abort::Dropped { oid }) => {
                debug!(request = %self.id, oid = %oid, "target unfound, dropping request");
                self.set_phase(RequestPhase::Dropped);
                self.events
                    .on_event(self.id, &RequestEvent::Dropped { oid });
            }
            Err(Abort::Cancelled { observed, .. }) => {
                debug!(
                    request = %self.id,
                    started_at = %self.start_epoch,
                    observed = %observed,
                    "cancelled by epoch change"
                );
                self.set_phase(RequestPhase::Cancelled);
                self.events
                    .on_event(self.id, &RequestEvent::Cancelled { observed });
            }
        }

        debug!(request = %self.id, "exit");
        self.handle.exit();
    }

    /// The pipeline body: strict stage order, every suspension point a
    /// cancellation point except the post-execution commit waits.
    async fn run_pipeline(&mut self, guard: &EpochGuard) -> PipelineResult<()> {
        let pp = self.shard.pipeline();
        let oid = self.inner.target();

        self.set_phase(RequestPhase::RecoverMissing);
        let mut entry = pp.recover_missing.request_entry(self.id);
        guard.run(entry.admitted()).await?;
        self.handle.occupy(entry.into_slot());

        match guard.run(self.shard.recover_missing(&oid)).await? {
            RecoveryOutcome::Found => {}
            RecoveryOutcome::Unfound => return Err(Abort::Dropped { oid }),
        }

        self.set_phase(RequestPhase::CheckComplete);
        let mut entry = pp.check_already_complete.request_entry(self.id);
        guard.run(entry.admitted()).await?;
        self.handle.occupy(entry.into_slot());

        self.set_phase(RequestPhase::Classify);
        let ops = self.inner.ops();
        debug!(request = %self.id, ops = ops.len(), "got sub-operations to execute");
        let op_info = match OpInfo::from_ops(&ops, self.shard.id()) {
            Ok(info) => info,
            Err(e) => Fatal::Classify(e).escalate(),
        };
        *self.classification.lock() = Some(op_info.clone());

        let descriptor = self.shard.obc_loader().descriptor(&oid);

        // Fix our place in the lock queue before any yield, so concurrent
        // arrivals acquire locks in arrival order.
        self.set_phase(RequestPhase::LockWait);
        let mut lock_entry = pp.lock_obc.request_entry(self.id);

        guard.run(lock_entry.admitted()).await?;
        self.handle.occupy(lock_entry.into_slot());

        let mode = self.shard.lock_mode(&op_info);
        let loaded = guard
            .run(self.shard.obc_loader().load_and_lock(descriptor, mode))
            .await?;
        let mut obc = match loaded {
            Ok(obc) => obc,
            // Recovery already ran; a load failure here is a defect.
            Err(e) => Fatal::ObjectLoad(e).escalate(),
        };
        self.set_phase(RequestPhase::Loaded);
        debug!(request = %self.id, obc = ?obc, "got obc, entering process stage");

        let mut entry = pp.process.request_entry(self.id);
        guard.run(entry.admitted()).await?;
        self.handle.occupy(entry.into_slot());
        self.set_phase(RequestPhase::Process);

        let executed = guard
            .run(self.shard.run_executer(self.id, &mut obc, &op_info, &ops))
            .await?;
        let effect = match executed {
            Ok(effect) => effect,
            Err(e) => Fatal::Execution(e).escalate(),
        };

        // The effect is applied; its bookkeeping is finalized even if the
        // epoch advances from here on, so the commit waits are unguarded.
        let handles = self.shard.submit_effect(effect);
        if handles.submitted.await.is_err() {
            warn!(request = %self.id, "commit path dropped the submitted signal");
        }
        self.set_phase(RequestPhase::Submitted);
        if handles.completed.await.is_err() {
            warn!(request = %self.id, "commit path dropped the completed signal");
        }

        self.set_phase(RequestPhase::Completed);
        debug!(request = %self.id, "complete");
        self.handle.complete();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::ShardConfig,
        shard::LocalShard,
        types::ShardId,
    };

    struct ReadRequest(ObjectId);

    impl InternalRequest for ReadRequest {
        fn target(&self) -> ObjectId {
            self.0.clone()
        }
        fn ops(&self) -> Vec<SubOp> {
            vec![SubOp::Read { off: 0, len: 4 }]
        }
    }

    #[tokio::test]
    #[should_panic(expected = "primary shard replica")]
    async fn test_non_primary_shard_is_a_programming_error() {
        let mut config = ShardConfig::new(ShardId(1), Epoch(1));
        config.primary = false;
        let shard = LocalShard::from_config(config).unwrap();
        let _ = InternalClientRequest::new(shard, Arc::new(ReadRequest(ObjectId::new("obj.a"))));
    }

    #[tokio::test]
    async fn test_new_request_snapshots_epoch() {
        let shard = LocalShard::from_config(ShardConfig::new(ShardId(1), Epoch(3))).unwrap();
        let request =
            InternalClientRequest::new(shard, Arc::new(ReadRequest(ObjectId::new("obj.a"))));
        assert_eq!(request.start_epoch(), Epoch(3));
        assert_eq!(request.phase_probe().get(), RequestPhase::Created);
    }
}
