//! Staged execution pipeline primitives
//!
//! - Ordered stages with synchronous enqueue and asynchronous admission
//! - The per-request lifecycle handle
//! - The epoch guard cancellation scope

pub mod guard;
pub mod handle;
pub mod stage;

pub use guard::EpochGuard;
pub use handle::{LifecycleHandle, ReleaseProbe};
pub use stage::{OrderedStage, ShardPipeline, StageClass, StageEntry, StageSlot};
