//! Object context loader
//!
//! Owns the in-memory, lockable representation of stored objects and hands
//! out loaned, locked references for the duration of a request's processing
//! stage. Lock mode is dictated by the request's classification record; the
//! usual readers-writer discipline holds per object across all concurrent
//! requests against the shard.

use std::{collections::HashMap, fmt, sync::Arc};

use dashmap::DashMap;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

use crate::{
    classify::LockMode,
    error::LoadError,
    types::ObjectId,
};

/// In-memory state of a single stored object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectState {
    pub exists: bool,
    pub data: Vec<u8>,
    pub attrs: HashMap<String, Vec<u8>>,
}

/// Lockable object context held by the loader's registry.
pub struct ObjectContext {
    oid: ObjectId,
    state: Arc<RwLock<ObjectState>>,
}

impl ObjectContext {
    fn new(oid: ObjectId) -> Arc<Self> {
        Arc::new(Self {
            oid,
            state: Arc::new(RwLock::new(ObjectState::default())),
        })
    }

    pub fn oid(&self) -> &ObjectId {
        &self.oid
    }
}

impl fmt::Debug for ObjectContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectContext({})", self.oid)
    }
}

/// A not-yet-loaded handle keyed by object identity, acquired before the
/// locking checkpoint.
pub struct ObcDescriptor {
    obc: Arc<ObjectContext>,
}

impl ObcDescriptor {
    pub fn oid(&self) -> &ObjectId {
        &self.obc.oid
    }
}

/// A loaned, locked reference to an object's state.
pub enum LockedObc {
    Shared {
        oid: ObjectId,
        guard: OwnedRwLockReadGuard<ObjectState>,
    },
    Exclusive {
        oid: ObjectId,
        guard: OwnedRwLockWriteGuard<ObjectState>,
    },
}

impl LockedObc {
    pub fn oid(&self) -> &ObjectId {
        match self {
            LockedObc::Shared { oid, .. } | LockedObc::Exclusive { oid, .. } => oid,
        }
    }

    pub fn mode(&self) -> LockMode {
        match self {
            LockedObc::Shared { .. } => LockMode::Shared,
            LockedObc::Exclusive { .. } => LockMode::Exclusive,
        }
    }

    pub fn state(&self) -> &ObjectState {
        match self {
            LockedObc::Shared { guard, .. } => guard,
            LockedObc::Exclusive { guard, .. } => guard,
        }
    }

    /// Mutable state access; only available under an exclusive lock.
    pub fn state_mut(&mut self) -> Option<&mut ObjectState> {
        match self {
            LockedObc::Shared { .. } => None,
            LockedObc::Exclusive { guard, .. } => Some(guard),
        }
    }
}

impl fmt::Debug for LockedObc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LockedObc({:?} {})", self.mode(), self.oid())
    }
}

/// Registry of object contexts for one shard.
#[derive(Default)]
pub struct ObcLoader {
    registry: DashMap<ObjectId, Arc<ObjectContext>>,
}

impl ObcLoader {
    pub fn new() -> Self {
        Self {
            registry: DashMap::new(),
        }
    }

    /// Acquire a handle descriptor for `oid` without loading or locking.
    pub fn descriptor(&self, oid: &ObjectId) -> ObcDescriptor {
        let obc = self
            .registry
            .entry(oid.clone())
            .or_insert_with(|| ObjectContext::new(oid.clone()))
            .clone();
        ObcDescriptor { obc }
    }

    /// Load the object context and take the requested lock. Waits for
    /// conflicting holders; fails only on unrecoverable conditions.
    pub async fn load_and_lock(
        &self,
        descriptor: ObcDescriptor,
        mode: LockMode,
    ) -> Result<LockedObc, LoadError> {
        let oid = descriptor.obc.oid.clone();
        let state = Arc::clone(&descriptor.obc.state);
        let locked = match mode {
            LockMode::Shared => LockedObc::Shared {
                oid,
                guard: state.read_owned().await,
            },
            LockMode::Exclusive => LockedObc::Exclusive {
                oid,
                guard: state.write_owned().await,
            },
        };
        Ok(locked)
    }

    /// Seed an object with initial state, marking it existent.
    pub async fn insert_object(&self, oid: ObjectId, state: ObjectState) {
        let descriptor = self.descriptor(&oid);
        *descriptor.obc.state.write().await = state;
    }

    /// Snapshot of an object's current state, if it has a context.
    pub async fn peek(&self, oid: &ObjectId) -> Option<ObjectState> {
        let obc = self.registry.get(oid)?.clone();
        let state = obc.state.read().await.clone();
        Some(state)
    }
}
