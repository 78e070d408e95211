//! Per-entity mutual exclusion for read-modify-write handlers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

struct Slot {
    lock: Arc<tokio::sync::Mutex<()>>,
    // Guards held plus tasks waiting for one.
    users: usize,
}

/// Registry of lazily created locks keyed by entity id.
///
/// An entry lives only while someone holds or waits for it, so the map is
/// bounded by the number of ids under contention right now.
#[derive(Clone, Default)]
pub struct EntityLocks {
    slots: Arc<Mutex<HashMap<Uuid, Slot>>>,
}

impl EntityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<Uuid, Slot>> {
        self.slots.lock().unwrap_or_else(|poisoned| {
            tracing::error!("entity lock registry poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Waits for exclusive access to `id`.
    pub async fn lock(&self, id: Uuid) -> EntityGuard {
        let lock = {
            let mut slots = self.slots();
            let slot = slots.entry(id).or_insert_with(|| Slot {
                lock: Arc::default(),
                users: 0,
            });
            slot.users += 1;
            slot.lock.clone()
        };
        // Registered before the await so a cancelled wait still unregisters.
        let registration = Registration {
            locks: self.clone(),
            id,
        };
        let guard = lock.lock_owned().await;
        EntityGuard {
            _guard: guard,
            _registration: registration,
        }
    }

    /// Number of ids currently held or awaited.
    pub fn active(&self) -> usize {
        self.slots().len()
    }
}

impl std::fmt::Debug for EntityLocks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityLocks")
            .field("active", &self.active())
            .finish()
    }
}

struct Registration {
    locks: EntityLocks,
    id: Uuid,
}

impl Drop for Registration {
    fn drop(&mut self) {
        let mut slots = self.locks.slots();
        if let Some(slot) = slots.get_mut(&self.id) {
            slot.users -= 1;
            if slot.users == 0 {
                slots.remove(&self.id);
            }
        }
    }
}

/// Exclusive access to one entity; released on drop.
pub struct EntityGuard {
    // Field order matters: the mutex is released before the slot is
    // unregistered.
    _guard: OwnedMutexGuard<()>,
    _registration: Registration,
}
