//! Core identifier and sub-operation types shared across the pipeline

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Monotonically increasing version of a shard's membership/role view.
///
/// Captured at request construction and compared against the live value at
/// every suspension point to detect staleness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Epoch(pub u64);

impl Epoch {
    pub fn next(self) -> Self {
        Epoch(self.0 + 1)
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// Identifier of a replicated shard (placement group).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShardId(pub u32);

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shard.{}", self.0)
    }
}

/// Identifier of a stored object within a shard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectId(String);

impl ObjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for one in-flight internal request.
///
/// Used as the ticket key in stage queues and as the logging correlation id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One element of the concrete sub-operation list an internal request wants
/// to perform against its target object.
///
/// The classifier inspects these to derive lock mode and routing; the
/// executor interprets them against object state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubOp {
    Read { off: u64, len: u64 },
    Stat,
    GetAttr { key: String },
    Write { off: u64, data: Vec<u8> },
    WriteFull { data: Vec<u8> },
    Truncate { size: u64 },
    SetAttr { key: String, value: Vec<u8> },
    Delete,
}

impl SubOp {
    /// Whether this sub-operation modifies object state.
    pub fn is_mutating(&self) -> bool {
        match self {
            SubOp::Read { .. } | SubOp::Stat | SubOp::GetAttr { .. } => false,
            SubOp::Write { .. }
            | SubOp::WriteFull { .. }
            | SubOp::Truncate { .. }
            | SubOp::SetAttr { .. }
            | SubOp::Delete => true,
        }
    }

    /// Sub-operation name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            SubOp::Read { .. } => "read",
            SubOp::Stat => "stat",
            SubOp::GetAttr { .. } => "getattr",
            SubOp::Write { .. } => "write",
            SubOp::WriteFull { .. } => "writefull",
            SubOp::Truncate { .. } => "truncate",
            SubOp::SetAttr { .. } => "setattr",
            SubOp::Delete => "delete",
        }
    }
}
