//! Request lifecycle handle
//!
//! Tracks which pipeline stage a request currently occupies and releases
//! that occupancy exactly once, no matter how the request body terminated.

use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};

use super::stage::StageSlot;

/// Per-request occupancy tracker.
///
/// The body swaps the occupied slot as it advances through stages (entering
/// stage N+1 vacates stage N); `exit` releases whatever is still held.
pub struct LifecycleHandle {
    slot: Option<StageSlot>,
    completed: bool,
    exited: bool,
    released: Arc<AtomicU32>,
}

impl LifecycleHandle {
    pub fn new() -> Self {
        Self {
            slot: None,
            completed: false,
            exited: false,
            released: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Counter observing the release action; reads exactly 1 after the
    /// request has terminated by any path.
    pub fn release_probe(&self) -> ReleaseProbe {
        ReleaseProbe(Arc::clone(&self.released))
    }

    /// Occupy a new stage slot, vacating the previously occupied stage.
    pub fn occupy(&mut self, slot: StageSlot) {
        self.slot = Some(slot);
    }

    /// Name of the currently occupied stage, if any.
    pub fn current_stage(&self) -> Option<&'static str> {
        self.slot.as_ref().map(|s| s.stage_name())
    }

    /// Mark normal completion of processing. Must precede any terminal exit
    /// of the body other than cancellation or drop.
    pub fn complete(&mut self) {
        self.completed = true;
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Unconditionally release stage occupancy. Idempotent; the release
    /// action itself fires exactly once.
    pub fn exit(&mut self) {
        if !self.exited {
            self.exited = true;
            self.slot = None;
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl Default for LifecycleHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LifecycleHandle {
    fn drop(&mut self) {
        // Backstop for paths that never reached an explicit exit.
        self.exit();
    }
}

/// Shared view of a handle's release counter, for callers verifying the
/// exactly-once release invariant.
#[derive(Clone)]
pub struct ReleaseProbe(Arc<AtomicU32>);

impl ReleaseProbe {
    pub fn count(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}
