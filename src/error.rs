//! Error and termination types for the shard pipeline
//!
//! The pipeline distinguishes exactly three termination classes:
//! - benign aborts ([`Abort`]), covering epoch-change cancellation and the
//!   distinguished "target unfound, drop it" outcome; both unwind the body
//!   and are converted to silent success at the top level,
//! - fatal invariant violations ([`Fatal`]), a closed set of conditions
//!   defined to be impossible given correct upstream behavior; these halt
//!   the request instead of returning,
//! - normal completion.

use crate::types::{Epoch, ObjectId, ShardId};

/// Result type threaded through every suspension point of the pipeline body.
///
/// Callers must branch on `Abort` explicitly; there is no blanket `?` into a
/// generic error type by design.
pub type PipelineResult<T> = Result<T, Abort>;

/// Benign termination of a pipeline body. Never surfaced to the caller of
/// `start()`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Abort {
    /// The shard's membership view advanced past the epoch captured at
    /// request construction (or the shard itself went away).
    #[error("cancelled on {shard}: started at {started_at}, observed {observed}")]
    Cancelled {
        shard: ShardId,
        started_at: Epoch,
        observed: Epoch,
    },

    /// The recovery probe reported the target object unfound; the request
    /// is dropped without error.
    #[error("{oid} is unfound, drop it")]
    Dropped { oid: ObjectId },
}

impl Abort {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Abort::Cancelled { .. })
    }

    pub fn is_dropped(&self) -> bool {
        matches!(self, Abort::Dropped { .. })
    }
}

/// Classification failure. Only produced for malformed sub-operation lists,
/// which internal callers are required never to send.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClassifyError {
    #[error("empty sub-operation list for {shard}")]
    EmptyOps { shard: ShardId },
}

/// Object context load failure. By the time the loader runs, recovery has
/// already ensured local availability, so any failure here is a defect.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error("no object context for {oid}")]
    UnknownObject { oid: ObjectId },
}

/// Executor failure. The executor is required to accept any classified
/// sub-operation list against a locked object context.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecError {
    #[error("sub-operation {op} rejected for {oid}: {reason}")]
    Rejected {
        oid: ObjectId,
        op: &'static str,
        reason: String,
    },
}

/// Closed set of invariant violations. These are not recoverable errors and
/// deliberately do not convert into [`Abort`]: the only thing a holder can
/// do with one is [`Fatal::escalate`].
#[derive(Debug, thiserror::Error)]
pub enum Fatal {
    #[error("classification failed: {0}")]
    Classify(#[from] ClassifyError),

    #[error("object context load failed: {0}")]
    ObjectLoad(#[from] LoadError),

    #[error("executor failed: {0}")]
    Execution(#[from] ExecError),
}

impl Fatal {
    /// Halt the offending request. Logs the violation, then aborts the
    /// request's task; a supervising runtime turns this into a process or
    /// shard fault.
    pub fn escalate(self) -> ! {
        tracing::error!(error = %self, "invariant violation in shard pipeline");
        panic!("invariant violation in shard pipeline: {self}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_display() {
        let abort = Abort::Cancelled {
            shard: ShardId(3),
            started_at: Epoch(5),
            observed: Epoch(6),
        };
        assert!(abort.is_cancelled());
        assert_eq!(
            abort.to_string(),
            "cancelled on shard.3: started at e5, observed e6"
        );
    }

    #[test]
    fn test_dropped_display() {
        let abort = Abort::Dropped {
            oid: ObjectId::new("rbd_header.1001"),
        };
        assert!(abort.is_dropped());
        assert_eq!(abort.to_string(), "rbd_header.1001 is unfound, drop it");
    }

    #[test]
    #[should_panic(expected = "invariant violation")]
    fn test_escalate_halts() {
        Fatal::Classify(ClassifyError::EmptyOps { shard: ShardId(0) }).escalate();
    }
}
