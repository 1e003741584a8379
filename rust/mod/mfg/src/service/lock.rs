use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Named mutexes, one per locked entity (assembly order, production order).
///
/// Keys are never evicted; the table grows with the number of distinct
/// orders touched by this process.
#[derive(Default)]
pub(crate) struct LockTable {
    slots: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl LockTable {
    /// Run `f` while holding the lock for `key`.
    ///
    /// The guarded data is `()`, so a poisoned slot (a panic inside an
    /// earlier holder) is simply re-acquired.
    pub(crate) fn with<R>(&self, key: &str, f: impl FnOnce() -> R) -> R {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(slots.entry(key.to_string()).or_default())
        };
        let _guard = slot.lock().unwrap_or_else(|e| e.into_inner());
        f()
    }
}

pub(crate) fn order_key(assembly_order_id: &str) -> String {
    format!("order/{assembly_order_id}")
}

pub(crate) fn showroom_key(production_order_id: &str) -> String {
    format!("showroom/{production_order_id}")
}
