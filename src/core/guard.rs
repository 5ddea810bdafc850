//! Single-Flight Guards
//!
//! Per-key async locks serializing token exchanges for the same node.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Per-node exchange locks. Clones share the same set.
#[derive(Clone, Debug, Default)]
pub struct FlightGuards {
    guards: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl FlightGuards {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other exchange for `key` is in flight.
    ///
    /// The exchange holds the returned guard until its credential write is done.
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let guard = {
            let mut guards = self.guards.lock().unwrap_or_else(|e| e.into_inner());
            guards
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        guard.lock_owned().await
    }

    /// Number of keys that ever held a guard.
    pub fn len(&self) -> usize {
        self.guards.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
