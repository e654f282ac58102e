//! Operation classification
//!
//! Derives the classification record for an internal request from its
//! concrete sub-operation list. Internal callers are required to produce
//! well-formed lists, so derivation failure is a fatal condition at the call
//! site, never a recoverable error.

use crate::{
    error::ClassifyError,
    types::{ShardId, SubOp},
};

/// Lock mode for the target object context, selected from the
/// classification record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

/// Classification record: what an operation will do and where it belongs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpInfo {
    read_only: bool,
    shard: ShardId,
}

impl OpInfo {
    /// Derive the record from a concrete sub-operation list.
    pub fn from_ops(ops: &[SubOp], shard: ShardId) -> Result<OpInfo, ClassifyError> {
        if ops.is_empty() {
            return Err(ClassifyError::EmptyOps { shard });
        }
        Ok(OpInfo {
            read_only: ops.iter().all(|op| !op.is_mutating()),
            shard,
        })
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn is_write(&self) -> bool {
        !self.read_only
    }

    /// Routing key: the shard this operation belongs to.
    pub fn shard(&self) -> ShardId {
        self.shard
    }

    /// Lock mode dictated by the classification.
    pub fn lock_mode(&self) -> LockMode {
        if self.read_only {
            LockMode::Shared
        } else {
            LockMode::Exclusive
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_only_list_classifies_shared() {
        let ops = vec![SubOp::Read { off: 0, len: 8 }, SubOp::Stat];
        let info = OpInfo::from_ops(&ops, ShardId(2)).unwrap();
        assert!(info.is_read_only());
        assert_eq!(info.lock_mode(), LockMode::Shared);
        assert_eq!(info.shard(), ShardId(2));
    }

    #[test]
    fn test_single_mutating_op_classifies_exclusive() {
        let ops = vec![
            SubOp::Read { off: 0, len: 8 },
            SubOp::Write {
                off: 0,
                data: vec![0xab],
            },
        ];
        let info = OpInfo::from_ops(&ops, ShardId(2)).unwrap();
        assert!(info.is_write());
        assert_eq!(info.lock_mode(), LockMode::Exclusive);
    }

    #[test]
    fn test_empty_list_is_malformed() {
        let err = OpInfo::from_ops(&[], ShardId(9)).unwrap_err();
        assert_eq!(err, ClassifyError::EmptyOps { shard: ShardId(9) });
    }
}
