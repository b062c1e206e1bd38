//! Per-client reentrant locks
//!
//! Every call into a client runs under that client's lock. The lock is reentrant so a
//! composite operation can call back into the same client on the thread that holds it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};

use crate::model::ClientId;

pub type ClientLock = Arc<ReentrantMutex<()>>;

#[derive(Debug, Default)]
pub struct ClientLocks {
    table: Mutex<HashMap<ClientId, ClientLock>>,
}

impl ClientLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock for `id`, created on first use
    pub fn lock_for(&self, id: ClientId) -> ClientLock {
        Arc::clone(self.table.lock().entry(id).or_default())
    }

    /// Drop the entry once the client is closed
    pub fn remove(&self, id: ClientId) {
        self.table.lock().remove(&id);
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.table.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
