use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::models::DayKey;

/// Held while a day's read-compute-write sequence runs.
pub type DayGuard = OwnedMutexGuard<()>;

/// One async mutex per (user, date). Holding the guard serializes the whole
/// read-compute-write sequence for that day; different days never contend.
#[derive(Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<DayKey, Arc<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: &DayKey) -> DayGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            // Entries nobody holds or waits on only have the map's reference.
            locks.retain(|k, l| k == key || Arc::strong_count(l) > 1);
            Arc::clone(
                locks
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
            )
        };
        lock.lock_owned().await
    }

    #[must_use]
    pub fn tracked(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
