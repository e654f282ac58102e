// These helpers are shared by the pipeline integration tests
#![allow(dead_code)]

use std::{
    sync::{Arc, Once},
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use shard_pipeline::{
    classify::OpInfo,
    commit::{CommitHandles, ShardEffect},
    error::ExecError,
    object::{LockedObc, ObcLoader},
    pipeline::ShardPipeline,
    request::PhaseProbe,
    shard::{RecoveryOutcome, Shard},
    Epoch, EventSink, InternalRequest, LocalShard, ObjectId, RequestEvent, RequestId, RequestPhase,
    ShardConfig, ShardId, SubOp,
};
use tokio::{
    sync::{oneshot, watch},
    time::{sleep, timeout},
};

/// Route pipeline tracing through the test harness, once per process.
/// Filter with `RUST_LOG=shard_pipeline=debug` when debugging a test.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Internal request with a fixed target and sub-operation list.
pub struct StaticRequest {
    pub oid: ObjectId,
    pub ops: Vec<SubOp>,
}

impl StaticRequest {
    pub fn read(oid: &ObjectId) -> Arc<Self> {
        Arc::new(Self {
            oid: oid.clone(),
            ops: vec![SubOp::Read { off: 0, len: 4 }, SubOp::Stat],
        })
    }

    pub fn write(oid: &ObjectId, data: Vec<u8>) -> Arc<Self> {
        Arc::new(Self {
            oid: oid.clone(),
            ops: vec![SubOp::WriteFull { data }],
        })
    }
}

impl InternalRequest for StaticRequest {
    fn target(&self) -> ObjectId {
        self.oid.clone()
    }

    fn ops(&self) -> Vec<SubOp> {
        self.ops.clone()
    }
}

/// Sink recording every event it sees.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(RequestId, RequestEvent)>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events_for(&self, request: RequestId) -> Vec<RequestEvent> {
        self.events
            .lock()
            .iter()
            .filter(|(id, _)| *id == request)
            .map(|(_, e)| e.clone())
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn on_event(&self, request: RequestId, event: &RequestEvent) {
        self.events.lock().push((request, event.clone()));
    }
}

/// Shard at epoch 1 with no durability delay.
pub fn test_shard() -> Arc<LocalShard> {
    init_tracing();
    LocalShard::from_config(ShardConfig::new(ShardId(1), Epoch(1))).unwrap()
}

/// Shard whose effects take `delay_ms` to become durable after sequencing.
pub fn slow_commit_shard(delay_ms: u64) -> Arc<LocalShard> {
    init_tracing();
    let mut config = ShardConfig::new(ShardId(1), Epoch(1));
    config.durability_delay_ms = delay_ms;
    LocalShard::from_config(config).unwrap()
}

/// Shard whose commit path acknowledges nothing: both signal senders are
/// dropped before the caller can await them. Models an apply task that died
/// between submission and acknowledgment.
pub struct DeadCommitShard(pub Arc<LocalShard>);

#[async_trait]
impl Shard for DeadCommitShard {
    fn id(&self) -> ShardId {
        self.0.id()
    }

    fn epoch(&self) -> Epoch {
        self.0.epoch()
    }

    fn epoch_watch(&self) -> watch::Receiver<Epoch> {
        self.0.epoch_watch()
    }

    fn is_primary(&self) -> bool {
        self.0.is_primary()
    }

    fn pipeline(&self) -> &ShardPipeline {
        self.0.pipeline()
    }

    fn obc_loader(&self) -> &ObcLoader {
        self.0.obc_loader()
    }

    async fn recover_missing(&self, oid: &ObjectId) -> RecoveryOutcome {
        self.0.recover_missing(oid).await
    }

    async fn run_executer(
        &self,
        request: RequestId,
        obc: &mut LockedObc,
        op_info: &OpInfo,
        ops: &[SubOp],
    ) -> Result<ShardEffect, ExecError> {
        self.0.run_executer(request, obc, op_info, ops).await
    }

    fn submit_effect(&self, _effect: ShardEffect) -> CommitHandles {
        let (_, submitted) = oneshot::channel();
        let (_, completed) = oneshot::channel();
        CommitHandles {
            submitted,
            completed,
        }
    }
}

/// Poll until the request reaches `phase`, or panic after two seconds.
pub async fn wait_for_phase(probe: &PhaseProbe, phase: RequestPhase) {
    timeout(Duration::from_secs(2), async {
        while probe.get() != phase {
            sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .unwrap_or_else(|_| {
        panic!(
            "timed out waiting for phase {:?}, stuck at {:?}",
            phase,
            probe.get()
        )
    });
}
