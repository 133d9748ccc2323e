//! Actor table
//!
//! Registry of every live actor in one runtime. Addresses are allocated
//! here; entries leave the table when their actor terminates or when the
//! runtime shuts down.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::actor::{ActorCell, ActorId};

/// Registry of live actors keyed by address
pub(crate) struct ActorTable {
    actors: RwLock<HashMap<ActorId, Arc<ActorCell>>>,
    next_id: AtomicU64,
}

impl ActorTable {
    pub(crate) fn new() -> Self {
        Self {
            actors: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocate a fresh address
    pub(crate) fn next_id(&self) -> ActorId {
        ActorId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn insert(&self, cell: Arc<ActorCell>) {
        self.actors.write().insert(cell.id(), cell);
    }

    /// Remove an entry; the caller drops it outside the table lock
    pub(crate) fn remove(&self, id: ActorId) -> Option<Arc<ActorCell>> {
        self.actors.write().remove(&id)
    }

    pub(crate) fn contains(&self, id: ActorId) -> bool {
        self.actors.read().contains_key(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.actors.read().len()
    }

    /// Empty the table, handing every entry back to the caller
    pub(crate) fn drain(&self) -> Vec<Arc<ActorCell>> {
        let mut actors = self.actors.write();
        actors.drain().map(|(_, cell)| cell).collect()
    }
}
