//! Staged, cancellation-aware execution pipeline for internally generated
//! operations against a replicated storage shard.
//!
//! An [`request::InternalClientRequest`] advances through the shard's ordered
//! pipeline stages under an epoch-bound cancellation guard, locks its target
//! object context in the mode its classification dictates, runs the
//! executor, and waits out the two-phase (submitted, completed) commit
//! acknowledgment before reporting completion.

pub mod classify;
pub mod commit;
pub mod config;
pub mod error;
pub mod events;
pub mod object;
pub mod pipeline;
pub mod request;
pub mod shard;
pub mod types;

// Re-export commonly used types for convenience
pub use classify::{LockMode, OpInfo};
pub use commit::{CommitHandles, CommitQueue, ShardEffect};
pub use config::{ConfigError, ConfigResult, ShardConfig};
pub use error::{Abort, ClassifyError, ExecError, Fatal, LoadError, PipelineResult};
pub use events::{EventSink, NullEventSink, RequestEvent, TracingEventSink};
pub use object::{LockedObc, ObcDescriptor, ObcLoader, ObjectContext, ObjectState};
pub use pipeline::{EpochGuard, LifecycleHandle, OrderedStage, ShardPipeline, StageClass};
pub use request::{InternalClientRequest, InternalRequest, RequestPhase};
pub use shard::{LocalShard, RecoveryOutcome, Shard};
pub use types::{Epoch, ObjectId, RequestId, ShardId, SubOp};
