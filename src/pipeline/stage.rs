//! Ordered pipeline stages
//!
//! Each stage is a named checkpoint holding one FIFO queue of tickets, one
//! per in-flight request. A single underlying structure exposes two distinct
//! entry primitives:
//! - [`OrderedStage::request_entry`] is a synchronous enqueue: the ticket
//!   is inserted during the call, before any yield, so arrival order fixes
//!   admission order regardless of scheduler interleaving,
//! - [`StageEntry::admitted`] is an asynchronous wait until the ticket's
//!   wait obligation at this stage is met.
//!
//! Keeping both on one structure (rather than a separate sync path) is what
//! makes the lock-acquisition checkpoint sound: a request can fix its place
//! in line without yielding, then wait.

use std::{collections::VecDeque, fmt, sync::Arc};

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::types::RequestId;

/// Concurrency class of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageClass {
    /// Order-preserving: tickets are admitted strictly in arrival order, but
    /// an admitted occupant does not block its successors.
    Ordered,
    /// Serializing: only the head ticket is admitted; successors wait until
    /// the head vacates.
    Exclusive,
}

struct Ticket {
    id: RequestId,
    admitted: bool,
    admit_tx: Option<oneshot::Sender<()>>,
}

#[derive(Default)]
struct StageInner {
    queue: VecDeque<Ticket>,
}

/// A named synchronization checkpoint all requests against a shard pass
/// through in order.
pub struct OrderedStage {
    name: &'static str,
    class: StageClass,
    inner: Mutex<StageInner>,
}

impl OrderedStage {
    pub fn new(name: &'static str, class: StageClass) -> Arc<Self> {
        Arc::new(Self {
            name,
            class,
            inner: Mutex::new(StageInner::default()),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn class(&self) -> StageClass {
        self.class
    }

    /// Number of tickets currently queued or occupying this stage.
    pub fn in_flight(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Synchronously insert a ticket for `id`. The returned entry must be
    /// awaited via [`StageEntry::admitted`] before the caller may proceed
    /// past this checkpoint.
    pub fn request_entry(self: &Arc<Self>, id: RequestId) -> StageEntry {
        let (tx, rx) = oneshot::channel();
        {
            let mut inner = self.inner.lock();
            inner.queue.push_back(Ticket {
                id,
                admitted: false,
                admit_tx: Some(tx),
            });
            Self::admit(self.class, &mut inner);
        }
        StageEntry {
            stage: Arc::clone(self),
            id,
            admit_rx: Some(rx),
            defused: false,
        }
    }

    fn vacate(&self, id: RequestId) {
        let mut inner = self.inner.lock();
        if let Some(pos) = inner.queue.iter().position(|t| t.id == id) {
            let _ = inner.queue.remove(pos);
            Self::admit(self.class, &mut inner);
        }
    }

    /// Wake every ticket whose wait obligation is now met.
    fn admit(class: StageClass, inner: &mut StageInner) {
        match class {
            StageClass::Exclusive => {
                if let Some(front) = inner.queue.front_mut() {
                    if !front.admitted {
                        front.admitted = true;
                        if let Some(tx) = front.admit_tx.take() {
                            let _ = tx.send(());
                        }
                    }
                }
            }
            StageClass::Ordered => {
                for ticket in inner.queue.iter_mut() {
                    if !ticket.admitted {
                        ticket.admitted = true;
                        if let Some(tx) = ticket.admit_tx.take() {
                            let _ = tx.send(());
                        }
                    }
                }
            }
        }
    }
}

impl fmt::Debug for OrderedStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderedStage")
            .field("name", &self.name)
            .field("class", &self.class)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

/// A pending entry into a stage: the ticket is already queued, admission may
/// still be outstanding. Dropping the entry withdraws the ticket.
pub struct StageEntry {
    stage: Arc<OrderedStage>,
    id: RequestId,
    admit_rx: Option<oneshot::Receiver<()>>,
    defused: bool,
}

impl StageEntry {
    /// Suspend until all predecessors at this stage have met the stage's
    /// vacate/admission requirement.
    pub async fn admitted(&mut self) {
        if let Some(rx) = self.admit_rx.take() {
            // The sender lives in our own ticket; it is dropped only when we
            // withdraw, so an error here is unreachable in practice.
            let _ = rx.await;
        }
    }

    /// Convert the admitted entry into an occupancy slot. The ticket stays
    /// queued until the slot is dropped.
    pub fn into_slot(mut self) -> StageSlot {
        self.defused = true;
        StageSlot {
            stage: Arc::clone(&self.stage),
            id: self.id,
        }
    }

    pub fn stage_name(&self) -> &'static str {
        self.stage.name
    }
}

impl Drop for StageEntry {
    fn drop(&mut self) {
        if !self.defused {
            self.stage.vacate(self.id);
        }
    }
}

/// Occupancy of one stage by one request. Dropping vacates the stage and
/// wakes successors.
pub struct StageSlot {
    stage: Arc<OrderedStage>,
    id: RequestId,
}

impl StageSlot {
    pub fn stage_name(&self) -> &'static str {
        self.stage.name
    }
}

impl Drop for StageSlot {
    fn drop(&mut self) {
        self.stage.vacate(self.id);
    }
}

impl fmt::Debug for StageSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StageSlot({} by {})", self.stage.name, self.id)
    }
}

/// The ordered set of checkpoints every internal request against a shard
/// passes through.
#[derive(Debug)]
pub struct ShardPipeline {
    pub recover_missing: Arc<OrderedStage>,
    pub check_already_complete: Arc<OrderedStage>,
    pub lock_obc: Arc<OrderedStage>,
    pub process: Arc<OrderedStage>,
}

impl ShardPipeline {
    pub fn new() -> Self {
        Self {
            recover_missing: OrderedStage::new("recover_missing", StageClass::Ordered),
            check_already_complete: OrderedStage::new("check_already_complete", StageClass::Ordered),
            lock_obc: OrderedStage::new("lock_obc", StageClass::Exclusive),
            process: OrderedStage::new("process", StageClass::Exclusive),
        }
    }

    /// Total occupancy across all stages, for draining checks.
    pub fn total_in_flight(&self) -> usize {
        self.recover_missing.in_flight()
            + self.check_already_complete.in_flight()
            + self.lock_obc.in_flight()
            + self.process.in_flight()
    }
}

impl Default for ShardPipeline {
    fn default() -> Self {
        Self::new()
    }
}
