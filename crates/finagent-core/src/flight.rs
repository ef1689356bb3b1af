//! Per-key single-flight: one dispatch at a time per cache fingerprint

use std::collections::HashSet;
use std::sync::{Condvar, Mutex};

#[derive(Default)]
pub(crate) struct InFlight {
    keys: Mutex<HashSet<String>>,
    released: Condvar,
}

impl InFlight {
    /// Block until no other caller holds `key`, then hold it until the guard drops
    pub(crate) fn acquire(&self, key: String) -> FlightGuard<'_> {
        let mut keys = self.keys.lock().unwrap_or_else(|e| e.into_inner());
        while keys.contains(&key) {
            keys = self
                .released
                .wait(keys)
                .unwrap_or_else(|e| e.into_inner());
        }
        keys.insert(key.clone());
        FlightGuard { owner: self, key }
    }
}

pub(crate) struct FlightGuard<'a> {
    owner: &'a InFlight,
    key: String,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        let mut keys = self.owner.keys.lock().unwrap_or_else(|e| e.into_inner());
        keys.remove(&self.key);
        self.owner.released.notify_all();
    }
}
